//! Channel schemes: which monopolar contacts to keep, or which bipolar pairs
//! to derive.
//!
//! A scheme arrives as a list of JSON records (one per output channel).  Its
//! form is decided by the columns present:
//!
//! * `contact_1` + `contact_2` → [`ChannelScheme::Pairs`]
//! * `contact`                 → [`ChannelScheme::Contacts`]
//! * neither                   → [`EegError::SchemeFormat`]
//!
//! Row order is output channel order.
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{EegError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ContactRow {
    pub contact: i64,
    pub label: String,
    /// Region and other per-contact metadata.
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairRow {
    pub contact_1: i64,
    pub contact_2: i64,
    pub label: String,
    pub extra: Map<String, Value>,
}

impl PairRow {
    /// True when `(a, b)` names this pair in either order.
    pub fn matches(&self, a: i64, b: i64) -> bool {
        (self.contact_1 == a && self.contact_2 == b) || (self.contact_1 == b && self.contact_2 == a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    Contacts,
    Pairs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelScheme {
    Contacts(Vec<ContactRow>),
    Pairs(Vec<PairRow>),
}

impl ChannelScheme {
    /// Build a scheme from JSON object records.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let has = |key: &str| records.iter().any(|r| r.get(key).is_some());

        if has("contact_1") && has("contact_2") {
            let rows = records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let c1 = contact_field(r, "contact_1", i)?;
                    let c2 = contact_field(r, "contact_2", i)?;
                    Ok(PairRow {
                        contact_1: c1,
                        contact_2: c2,
                        label: label_field(r).unwrap_or_else(|| format!("{c1}-{c2}")),
                        extra: extra_fields(r, &["contact_1", "contact_2", "label"]),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ChannelScheme::Pairs(rows))
        } else if has("contact") {
            let rows = records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let c = contact_field(r, "contact", i)?;
                    Ok(ContactRow {
                        contact: c,
                        label: label_field(r).unwrap_or_else(|| c.to_string()),
                        extra: extra_fields(r, &["contact", "label"]),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ChannelScheme::Contacts(rows))
        } else {
            Err(EegError::SchemeFormat(
                "the passed scheme appears to be neither contacts nor pairs".into(),
            ))
        }
    }

    /// Load from a JSON file holding either an array of records or an object
    /// keyed by label.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let records: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Object(map) => map
                .into_iter()
                .map(|(label, mut rec)| {
                    if let Value::Object(obj) = &mut rec {
                        obj.entry("label").or_insert(Value::String(label));
                    }
                    rec
                })
                .collect(),
            _ => {
                return Err(EegError::SchemeFormat(format!(
                    "{}: expected an array or object of records",
                    path.display()
                )))
            }
        };
        Self::from_records(&records)
    }

    /// Pair scheme from `(contact_1, contact_2, label)` triples.
    pub fn pairs<S: Into<String>>(rows: impl IntoIterator<Item = (i64, i64, S)>) -> Self {
        ChannelScheme::Pairs(
            rows.into_iter()
                .map(|(contact_1, contact_2, label)| PairRow {
                    contact_1,
                    contact_2,
                    label: label.into(),
                    extra: Map::new(),
                })
                .collect(),
        )
    }

    /// Contact scheme from `(contact, label)` tuples.
    pub fn contacts<S: Into<String>>(rows: impl IntoIterator<Item = (i64, S)>) -> Self {
        ChannelScheme::Contacts(
            rows.into_iter()
                .map(|(contact, label)| ContactRow { contact, label: label.into(), extra: Map::new() })
                .collect(),
        )
    }

    pub fn kind(&self) -> SchemeKind {
        match self {
            ChannelScheme::Contacts(_) => SchemeKind::Contacts,
            ChannelScheme::Pairs(_) => SchemeKind::Pairs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChannelScheme::Contacts(rows) => rows.len(),
            ChannelScheme::Pairs(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> Vec<String> {
        match self {
            ChannelScheme::Contacts(rows) => rows.iter().map(|r| r.label.clone()).collect(),
            ChannelScheme::Pairs(rows) => rows.iter().map(|r| r.label.clone()).collect(),
        }
    }

    /// Every contact the scheme touches, sorted and deduplicated.
    pub fn unique_contacts(&self) -> Vec<i64> {
        let mut out: Vec<i64> = match self {
            ChannelScheme::Contacts(rows) => rows.iter().map(|r| r.contact).collect(),
            ChannelScheme::Pairs(rows) => rows
                .iter()
                .flat_map(|r| [r.contact_1, r.contact_2])
                .collect(),
        };
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Keep the rows for which `keep(label, metadata)` holds.
    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str, &Map<String, Value>) -> bool,
    {
        match self {
            ChannelScheme::Contacts(rows) => ChannelScheme::Contacts(
                rows.iter().filter(|r| keep(&r.label, &r.extra)).cloned().collect(),
            ),
            ChannelScheme::Pairs(rows) => ChannelScheme::Pairs(
                rows.iter().filter(|r| keep(&r.label, &r.extra)).cloned().collect(),
            ),
        }
    }

    /// Keep only rows whose metadata field `key` equals `value`, e.g.
    /// `("ind.region", "insula")`.
    pub fn filter_region(&self, key: &str, value: &str) -> Self {
        self.retain(|_, extra| extra.get(key).and_then(Value::as_str) == Some(value))
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Self {
        match self {
            ChannelScheme::Contacts(rows) => ChannelScheme::Contacts(rows.iter().take(n).cloned().collect()),
            ChannelScheme::Pairs(rows) => ChannelScheme::Pairs(rows.iter().take(n).cloned().collect()),
        }
    }
}

/// Whether a reader should load `contact`.  Without a scheme every contact
/// is included.
pub fn includes_contact(scheme: Option<&ChannelScheme>, contact: i64) -> bool {
    match scheme {
        None => true,
        Some(s) => s.unique_contacts().binary_search(&contact).is_ok(),
    }
}

fn contact_field(record: &Value, key: &str, row: usize) -> Result<i64> {
    let v = record
        .get(key)
        .ok_or_else(|| EegError::SchemeFormat(format!("row {row} lacks '{key}'")))?;
    parse_contact(v).ok_or_else(|| EegError::SchemeFormat(format!("row {row}: '{key}' = {v} is not a contact number")))
}

/// Contacts are integers, but some exports store them as zero-padded
/// strings (`"003"`) or floats.
pub(crate) fn parse_contact(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label_field(record: &Value) -> Option<String> {
    record.get("label").and_then(Value::as_str).map(str::to_string)
}

fn extra_fields(record: &Value, skip: &[&str]) -> Map<String, Value> {
    record
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| !skip.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

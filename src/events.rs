//! Behavioral event rows and subject protocol detection.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};

/// One row of an event log.  Only the columns needed to locate and epoch
/// EEG are typed; everything else rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub experiment: String,
    #[serde(default)]
    pub session: i64,
    /// Source recording: absolute, or relative to the processed-EEG dir.
    #[serde(default, deserialize_with = "nullable_string")]
    pub eegfile: String,
    /// Event onset in samples from the start of `eegfile`.
    pub eegoffset: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn nullable_string<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

impl EventRow {
    /// Minimal row carrying only an offset.
    pub fn at_offset(eegoffset: i64) -> Self {
        Self {
            subject: String::new(),
            experiment: String::new(),
            session: 0,
            eegfile: String::new(),
            eegoffset,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_source(mut self, subject: &str, experiment: &str, session: i64, eegfile: &str) -> Self {
        self.subject = subject.to_string();
        self.experiment = experiment.to_string();
        self.session = session;
        self.eegfile = eegfile.to_string();
        self
    }
}

/// Read a JSON array of event rows.
pub fn read_events_json(path: &Path) -> Result<Vec<EventRow>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Data-collection protocol, derived from the subject code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    R1,
    Ltp,
    PyFr,
}

impl Protocol {
    pub fn for_subject(subject: &str) -> Result<Self> {
        if subject.starts_with("R1") {
            Ok(Protocol::R1)
        } else if subject.starts_with("LTP") {
            Ok(Protocol::Ltp)
        } else if subject.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            Ok(Protocol::PyFr)
        } else {
            Err(EegError::UnknownProtocol(subject.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::R1 => "r1",
            Protocol::Ltp => "ltp",
            Protocol::PyFr => "pyFR",
        }
    }

    /// Whether recordings are described by `sources.json` (otherwise by a
    /// legacy `params.txt`).
    pub fn uses_sources_json(&self) -> bool {
        matches!(self, Protocol::R1 | Protocol::Ltp)
    }
}

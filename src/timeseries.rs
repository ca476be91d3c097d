//! In-memory result container: `[epochs, channels, time]` data plus the
//! metadata needed to interpret it.
use ndarray::{concatenate, Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use serde_json::Value;

use crate::epoch::Epoch;
use crate::error::{EegError, Result};
use crate::events::EventRow;

// ── Attrs ────────────────────────────────────────────────────────────────

/// Ordered attribute bag.
///
/// Insertion order is preserved.  Re-inserting an existing key replaces the
/// value in place; [`merge`](Attrs::merge) applies the same rule, so when
/// several bags are merged the **last** writer of a key wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    entries: Vec<(String, Value)>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Merge `other` into `self`; keys in `other` overwrite.
    pub fn merge(&mut self, other: &Attrs) {
        for (k, v) in &other.entries {
            self.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// As a JSON object (order preserved by insertion into the map).
    pub fn to_json(&self) -> Value {
        Value::Object(self.entries.iter().cloned().collect())
    }
}

// ── TimeSeries ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatDim {
    /// Stack epochs (axis 0).
    Events,
    /// Append samples (axis 2).
    Time,
}

/// EEG time series shaped `[epochs, channels, time]`.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub data: Array3<f64>,
    /// Hz.
    pub samplerate: f64,
    /// Sample range each epoch was cut from; `(-1, -1)` when unknown.
    pub epochs: Vec<Epoch>,
    /// Source event for each epoch (may be empty when not event-locked).
    pub events: Vec<EventRow>,
    pub channels: Vec<String>,
    /// Time of the first sample of each epoch, in ms relative to the event.
    pub tstart: f64,
    pub attrs: Attrs,
}

impl TimeSeries {
    /// Wrap 2-D `[channels, time]` or 3-D `[epochs, channels, time]` data.
    ///
    /// Missing `epochs` default to `(-1, -1)` per epoch and missing channels
    /// to `CH1, CH2, …`.
    ///
    /// # Errors
    ///
    /// [`EegError::DimensionMismatch`] when `data` is neither 2- nor 3-D or
    /// when `epochs`/`channels`/`events` disagree with its shape.
    pub fn new(
        data: ArrayD<f64>,
        samplerate: f64,
        epochs: Option<Vec<Epoch>>,
        channels: Option<Vec<String>>,
        tstart: f64,
        attrs: Option<Attrs>,
    ) -> Result<Self> {
        let data: Array3<f64> = match data.ndim() {
            2 => {
                let d2 = data.into_dimensionality::<Ix2>()?;
                d2.insert_axis(Axis(0))
            }
            3 => data.into_dimensionality::<Ix3>()?,
            n => {
                return Err(EegError::DimensionMismatch(format!(
                    "data must be 2- or 3-dimensional, got {n}"
                )))
            }
        };
        Self::from_array3(data, samplerate, epochs, channels, Vec::new(), tstart, attrs)
    }

    pub fn from_array3(
        data: Array3<f64>,
        samplerate: f64,
        epochs: Option<Vec<Epoch>>,
        channels: Option<Vec<String>>,
        events: Vec<EventRow>,
        tstart: f64,
        attrs: Option<Attrs>,
    ) -> Result<Self> {
        let (n_ep, n_ch, _) = data.dim();

        let epochs = match epochs {
            Some(e) if e.len() != n_ep => {
                return Err(EegError::DimensionMismatch(format!(
                    "{} epochs for {n_ep} rows of data",
                    e.len()
                )))
            }
            Some(e) => e,
            None => vec![Epoch::new(-1, Some(-1)); n_ep],
        };
        let channels = match channels {
            Some(c) if c.len() != n_ch => {
                return Err(EegError::DimensionMismatch(format!(
                    "{} channel labels for {n_ch} channels of data",
                    c.len()
                )))
            }
            Some(c) => c,
            None => (1..=n_ch).map(|i| format!("CH{i}")).collect(),
        };
        if !events.is_empty() && events.len() != n_ep {
            return Err(EegError::DimensionMismatch(format!(
                "{} events for {n_ep} epochs",
                events.len()
            )));
        }

        Ok(Self {
            data,
            samplerate,
            epochs,
            events,
            channels,
            tstart,
            attrs: attrs.unwrap_or_default(),
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn n_samples(&self) -> usize {
        self.data.dim().2
    }

    /// Per-sample times in ms.
    pub fn time(&self) -> Vec<f64> {
        let step = 1000.0 / self.samplerate;
        (0..self.n_samples()).map(|i| self.tstart + i as f64 * step).collect()
    }

    /// Start sample of each epoch.
    pub fn start_offsets(&self) -> Vec<i64> {
        self.epochs.iter().map(|e| e.start).collect()
    }

    /// One epoch as `[channels, time]`.
    pub fn epoch(&self, index: usize) -> Array2<f64> {
        self.data.index_axis(Axis(0), index).to_owned()
    }

    /// Concatenate several series.
    ///
    /// All inputs must share the sample rate and channel labels.  Along
    /// [`ConcatDim::Events`] they must also share the sample count; epochs and
    /// events are stacked in input order.  Along [`ConcatDim::Time`] they must
    /// share the epoch list.  Attributes are merged last-write-wins.
    pub fn concatenate(series: Vec<TimeSeries>, dim: ConcatDim) -> Result<TimeSeries> {
        let Some(first) = series.first() else {
            return Err(EegError::InvalidInput("nothing to concatenate".into()));
        };
        let samplerate = first.samplerate;
        let channels = first.channels.clone();
        let tstart = first.tstart;

        if series.iter().any(|s| s.samplerate != samplerate) {
            return Err(EegError::DimensionMismatch(
                "sample rates must be the same for all series".into(),
            ));
        }
        if series.iter().any(|s| s.channels != channels) {
            return Err(EegError::DimensionMismatch(
                "channels must be the same for all series".into(),
            ));
        }

        let mut attrs = Attrs::new();
        for s in &series {
            attrs.merge(&s.attrs);
        }

        match dim {
            ConcatDim::Events => {
                let n_t = first.n_samples();
                if series.iter().any(|s| s.n_samples() != n_t) {
                    return Err(EegError::DimensionMismatch(
                        "number of samples must match to concatenate events".into(),
                    ));
                }
                let views: Vec<_> = series.iter().map(|s| s.data.view()).collect();
                let data = concatenate(Axis(0), &views)?;
                // An epochless part carries no events and does not void the others.
                let with_events = series.iter().any(|s| !s.events.is_empty())
                    && series.iter().all(|s| s.events.len() == s.data.dim().0);
                let mut epochs = Vec::new();
                let mut events = Vec::new();
                for s in series {
                    epochs.extend(s.epochs);
                    if with_events {
                        events.extend(s.events);
                    }
                }
                TimeSeries::from_array3(data, samplerate, Some(epochs), Some(channels), events, tstart, Some(attrs))
            }
            ConcatDim::Time => {
                let epochs = first.epochs.clone();
                if series.iter().any(|s| s.epochs.len() != epochs.len()) {
                    return Err(EegError::DimensionMismatch(
                        "epoch counts must match to concatenate in time".into(),
                    ));
                }
                let events = first.events.clone();
                let views: Vec<_> = series.iter().map(|s| s.data.view()).collect();
                let data = concatenate(Axis(2), &views)?;
                TimeSeries::from_array3(data, samplerate, Some(epochs), Some(channels), events, tstart, Some(attrs))
            }
        }
    }
}

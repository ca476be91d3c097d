//! Event-locked epoching.
//!
//! Converts per-event sample offsets plus a window relative to each event
//! (in milliseconds) into sample-index ranges:
//!
//! ```text
//! start = eegoffset + round(rel_start · rate / 1000)
//! stop  = start     + round((rel_stop − rel_start) · rate / 1000)
//! ```
//!
//! Rounding the span once keeps every epoch exactly
//! `round((rel_stop − rel_start) · rate / 1000)` samples long, whatever the
//! offset.  The window `(0, -1)` is the whole-session sentinel and yields a
//! single `(0, None)` epoch.
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};
use crate::events::EventRow;

/// Half-open sample range `[start, stop)`; `stop == None` runs to the end of
/// the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Epoch {
    pub start: i64,
    pub stop: Option<i64>,
}

impl Epoch {
    pub fn new(start: i64, stop: Option<i64>) -> Self {
        Self { start, stop }
    }

    /// The whole recording.
    pub fn whole() -> Self {
        Self { start: 0, stop: None }
    }

    /// Number of samples, when bounded.
    pub fn len(&self) -> Option<usize> {
        self.stop.map(|s| (s - self.start).max(0) as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Bounds-check against a recording of `n_samples` and return the
    /// concrete index range.
    pub fn resolve(&self, n_samples: usize) -> Result<Range<usize>> {
        let out_of_range = || EegError::EpochOutOfRange {
            start: self.start,
            stop: self.stop,
            n_samples,
        };
        if self.start < 0 {
            return Err(out_of_range());
        }
        let start = self.start as usize;
        let stop = match self.stop {
            None => n_samples,
            Some(s) if s < self.start || s as usize > n_samples => return Err(out_of_range()),
            Some(s) => s as usize,
        };
        if start > stop {
            return Err(out_of_range());
        }
        Ok(start..stop)
    }
}

/// Window relative to each event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    Relative { rel_start_ms: f64, rel_stop_ms: f64 },
    WholeSession,
}

impl Window {
    /// Validate a `(rel_start, rel_stop)` pair.  `(0, -1)` maps to
    /// [`Window::WholeSession`].
    pub fn from_bounds(rel_start_ms: f64, rel_stop_ms: f64) -> Result<Self> {
        if rel_start_ms == 0.0 && rel_stop_ms == -1.0 {
            return Ok(Window::WholeSession);
        }
        if rel_start_ms > rel_stop_ms {
            return Err(EegError::InvalidWindow {
                rel_start: rel_start_ms,
                rel_stop: rel_stop_ms,
            });
        }
        Ok(Window::Relative { rel_start_ms, rel_stop_ms })
    }

    pub fn is_whole_session(&self) -> bool {
        matches!(self, Window::WholeSession)
    }

    /// Samples per epoch, `None` for the whole session.
    pub fn span_samples(&self, sample_rate: f64) -> Option<usize> {
        match *self {
            Window::Relative { rel_start_ms, rel_stop_ms } => {
                Some(ms_to_samples(rel_stop_ms - rel_start_ms, sample_rate).max(0) as usize)
            }
            Window::WholeSession => None,
        }
    }

    /// Start time of the window in ms (`0` for the whole session).
    pub fn tstart_ms(&self) -> f64 {
        match *self {
            Window::Relative { rel_start_ms, .. } => rel_start_ms,
            Window::WholeSession => 0.0,
        }
    }
}

/// Milliseconds → samples, rounded to nearest.
pub fn ms_to_samples(ms: f64, sample_rate: f64) -> i64 {
    (sample_rate * ms / 1000.0).round() as i64
}

/// Samples → milliseconds.
pub fn samples_to_ms(samples: i64, sample_rate: f64) -> f64 {
    1000.0 * samples as f64 / sample_rate
}

/// Sample offsets for events given only their onset times in ms.
pub fn onsets_to_offsets(onsets_ms: &[f64], sample_rate: f64) -> Vec<i64> {
    onsets_ms.iter().map(|&ms| ms_to_samples(ms, sample_rate)).collect()
}

/// One epoch per offset (or a single whole-recording epoch).
pub fn epochs_from_offsets(offsets: &[i64], window: &Window, sample_rate: f64) -> Vec<Epoch> {
    match *window {
        Window::WholeSession => vec![Epoch::whole()],
        Window::Relative { rel_start_ms, rel_stop_ms } => {
            let lead = ms_to_samples(rel_start_ms, sample_rate);
            let span = ms_to_samples(rel_stop_ms - rel_start_ms, sample_rate);
            offsets
                .iter()
                .map(|&off| Epoch::new(off + lead, Some(off + lead + span)))
                .collect()
        }
    }
}

/// Convert event rows into epochs.
///
/// # Errors
///
/// [`EegError::InvalidWindow`] when `rel_start_ms > rel_stop_ms` (the
/// `(0, -1)` sentinel excepted).
pub fn to_epochs(
    events: &[EventRow],
    rel_start_ms: f64,
    rel_stop_ms: f64,
    sample_rate: f64,
) -> Result<Vec<Epoch>> {
    let window = Window::from_bounds(rel_start_ms, rel_stop_ms)?;
    let offsets: Vec<i64> = events.iter().map(|e| e.eegoffset).collect();
    Ok(epochs_from_offsets(&offsets, &window, sample_rate))
}

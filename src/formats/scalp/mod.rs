//! Scalp EEG: continuous recordings from BioSemi (`.bdf`), EGI simple
//! binary (`.raw`) and cleaned FIFF (`<stem>_clean_raw.fif`) files.
//!
//! Each backend yields a [`ContinuousRecording`]; [`ScalpReader`] then cuts
//! it into epochs.  Epochs that start before sample 0 are dropped from the
//! front of the request and epochs that end past the last sample from the
//! back; the counts are exposed through [`ScalpReader::truncation`] so the
//! caller can drop the matching event rows.
pub mod bdf;
pub mod egi;
pub mod fif;

use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{uniform_len, EegFormat, RawChannelBlock, ReaderArgs};
use crate::epoch::Epoch;
use crate::error::{EegError, Result};
use crate::reference::Rereferenced;
use crate::scheme::ChannelScheme;
use crate::timeseries::Attrs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Eeg,
    Eog,
    Misc,
    Stim,
}

/// A continuous multi-channel recording, `[channel, time]`.
#[derive(Debug, Clone)]
pub struct ContinuousRecording {
    pub data: Array2<f64>,
    /// Hz.
    pub sfreq: f64,
    /// Absolute sample number of column 0. Event offsets count from the
    /// acquisition start, so they are shifted by this before slicing.
    pub first_samp: i64,
    pub ch_names: Vec<String>,
    pub ch_types: Vec<ChannelType>,
}

impl ContinuousRecording {
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn rename_channel(&mut self, from: &str, to: &str) {
        if let Some(name) = self.ch_names.iter_mut().find(|n| n.as_str() == from) {
            *name = to.to_string();
        }
    }

    pub fn set_channel_type(&mut self, name: &str, kind: ChannelType) {
        if let Some(i) = self.ch_names.iter().position(|n| n == name) {
            self.ch_types[i] = kind;
        }
    }

    /// Recording metadata for the result's attributes.
    pub fn info(&self) -> serde_json::Value {
        json!({
            "sfreq": self.sfreq,
            "n_times": self.n_times(),
            "first_samp": self.first_samp,
            "ch_names": self.ch_names,
            "ch_types": self.ch_types,
        })
    }
}

/// `<stem>_clean_raw.fif` next to the original recording.
pub fn clean_path(path: &Path) -> PathBuf {
    let stem = path.with_extension("");
    let mut name = stem.into_os_string();
    name.push("_clean_raw.fif");
    PathBuf::from(name)
}

/// Load the recording behind `path`.
///
/// `data_format` is the extension recorded in the session metadata; the path
/// suffix decides when it is empty.
pub fn load_recording(path: &Path, data_format: &str, clean: bool) -> Result<ContinuousRecording> {
    if clean {
        let cleaned = clean_path(path);
        tracing::info!(path = %cleaned.display(), "loading cleaned scalp EEG");
        return fif::read_raw_fif(&cleaned);
    }

    let ext = if data_format.is_empty() {
        path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default()
    } else {
        data_format.to_string()
    };
    match ext.as_str() {
        ".bdf" => bdf::read_bdf(path),
        ".mff" => Err(EegError::UnsupportedFormat(format!(
            "{}: EGI .mff packages are not supported",
            path.display()
        ))),
        _ if path.is_dir() => Err(EegError::UnsupportedFormat(format!(
            "{}: EGI .mff packages are not supported",
            path.display()
        ))),
        _ => egi::read_egi_raw(path),
    }
}

pub struct ScalpReader {
    path: PathBuf,
    data_format: String,
    epochs: Vec<Epoch>,
    scheme: Option<ChannelScheme>,
    clean: bool,
    truncated: (usize, usize),
    info: Option<serde_json::Value>,
}

impl ScalpReader {
    pub fn new(args: ReaderArgs) -> Self {
        Self {
            path: args.path,
            data_format: args.data_format,
            epochs: args.epochs,
            scheme: args.scheme,
            clean: args.clean,
            truncated: (0, 0),
            info: None,
        }
    }

    /// `(dropped from the front, dropped from the back)` by the last
    /// [`read`](EegFormat::read).
    pub fn truncation(&self) -> (usize, usize) {
        self.truncated
    }

    fn is_whole_session(&self) -> bool {
        matches!(self.epochs.as_slice(), [e] if *e == Epoch::whole())
    }
}

/// Drop epochs that fall outside `[0, n_times)` from either end.
pub fn trim_epochs(epochs: &[Epoch], n_times: usize) -> (Vec<Epoch>, usize, usize) {
    let n = n_times as i64;
    let mut lo = 0;
    let mut hi = epochs.len();
    while lo < hi && epochs[lo].start < 0 {
        lo += 1;
    }
    while hi > lo && epochs[hi - 1].stop.unwrap_or(n) > n {
        hi -= 1;
    }
    (epochs[lo..hi].to_vec(), lo, epochs.len() - hi)
}

impl EegFormat for ScalpReader {
    fn read(&mut self) -> Result<RawChannelBlock> {
        let rec = load_recording(&self.path, &self.data_format, self.clean)?;
        let n_ch = rec.n_channels();

        let data = if self.is_whole_session() {
            self.truncated = (0, 0);
            rec.data.clone().insert_axis(Axis(0))
        } else {
            let shifted: Vec<Epoch> = self
                .epochs
                .iter()
                .map(|e| Epoch::new(e.start - rec.first_samp, e.stop.map(|s| s - rec.first_samp)))
                .collect();
            let (kept, pre, post) = trim_epochs(&shifted, rec.n_times());
            if pre + post > 0 {
                tracing::warn!(pre, post, path = %self.path.display(), "dropped events outside the recording");
            }
            self.truncated = (pre, post);

            let ranges = kept
                .iter()
                .map(|e| e.resolve(rec.n_times()))
                .collect::<Result<Vec<_>>>()?;
            // Everything trimmed still keeps the epoch length on the time axis.
            let n_t = if ranges.is_empty() {
                shifted.first().and_then(Epoch::len).unwrap_or(0)
            } else {
                uniform_len(&ranges)?
            };
            let mut out = Array3::<f64>::zeros((ranges.len(), n_ch, n_t));
            for (e, r) in ranges.into_iter().enumerate() {
                out.slice_mut(s![e, .., ..]).assign(&rec.data.slice(s![.., r]));
            }
            out
        };

        tracing::info!(
            path = %self.path.display(),
            channels = n_ch,
            epochs = data.dim().0,
            sfreq = rec.sfreq,
            "read scalp EEG"
        );
        self.info = Some(rec.info());
        let mut block = RawChannelBlock::new(data, (1..=n_ch as i64).collect())?;
        block.names = Some(rec.ch_names);
        Ok(block)
    }

    fn scheme(&self) -> Option<&ChannelScheme> {
        self.scheme.as_ref()
    }

    fn rereference(&self, _block: &RawChannelBlock) -> Result<Rereferenced> {
        Err(EegError::IncompatibleParameters(
            "scalp EEG is returned as recorded; rereferencing is not supported".into(),
        ))
    }

    fn attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        if let Some(info) = &self.info {
            attrs.insert("scalp_info", info.clone());
        }
        if !self.is_whole_session() {
            attrs.insert("truncated_events_pre", self.truncated.0);
            attrs.insert("truncated_events_post", self.truncated.1);
        }
        attrs
    }
}

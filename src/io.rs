//! Safetensors export of loaded EEG.
//!
//! [`write_timeseries`] stores:
//!
//! | Tensor       | dtype | shape       |
//! |--------------|-------|-------------|
//! | `data`       | F64   | `[E, C, T]` |
//! | `samplerate` | F64   | `[1]`       |
//! | `epochs`     | I64   | `[E, 2]` (`stop = -1` for open-ended) |
//! | `offsets`    | I64   | `[E]` event `eegoffset`s, when events are present |
//!
//! plus `__metadata__` with `channels`, `tstart` and `attrs` as JSON strings.
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::timeseries::TimeSeries;

/// Simple safetensors file writer for F64 and I64 tensors.
///
/// ```rust,no_run
/// use eegio::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("signal", &[1.0, 2.0, 3.0], &[1, 3]);
/// w.add_metadata("units", "V");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: Map<String, Value>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    /// String-valued `__metadata__` entry.
    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), Value::String(value.into()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header_map = Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), Value::Object(self.metadata.clone()));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::fs::File::create(path)?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

/// Write a loaded series to `path`.
pub fn write_timeseries(ts: &TimeSeries, path: &Path) -> Result<()> {
    let (n_ep, n_ch, n_t) = ts.shape();
    let mut w = StWriter::new();

    let data: Vec<f64> = ts.data.iter().copied().collect();
    w.add_f64("data", &data, &[n_ep, n_ch, n_t]);
    w.add_f64("samplerate", &[ts.samplerate], &[1]);

    let epochs: Vec<i64> = ts.epochs.iter().flat_map(|e| [e.start, e.stop.unwrap_or(-1)]).collect();
    w.add_i64("epochs", &epochs, &[ts.epochs.len(), 2]);
    if !ts.events.is_empty() {
        let offsets: Vec<i64> = ts.events.iter().map(|e| e.eegoffset).collect();
        w.add_i64("offsets", &offsets, &[offsets.len()]);
    }

    w.add_metadata("channels", serde_json::to_string(&ts.channels)?);
    w.add_metadata("tstart", ts.tstart.to_string());
    w.add_metadata("attrs", ts.attrs.to_json().to_string());
    w.write(path)?;

    tracing::info!(path = %path.display(), epochs = n_ep, channels = n_ch, samples = n_t, "wrote safetensors");
    Ok(())
}

/// Parse the JSON header of a safetensors file.
pub fn read_header(path: &Path) -> Result<Map<String, Value>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_header(&bytes)?)
}

fn parse_header(bytes: &[u8]) -> anyhow::Result<Map<String, Value>> {
    if bytes.len() < 8 {
        bail!("safetensors file too small");
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    let end = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).context("safetensors header truncated")?;
    serde_json::from_slice(&bytes[8..end]).context("failed to parse safetensors header")
}

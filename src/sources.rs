//! Recording metadata (`sources.json` / `params.txt`).
//!
//! `sources.json` maps each recording to its metadata.  When every recording
//! agrees on a field the collapsed map holds that single value; otherwise it
//! holds the list of values.  Nested objects are skipped.
//!
//! `params.txt` is the older whitespace-separated `key value` format:
//!
//! ```text
//! samplerate 500
//! dataformat 'int16'
//! gain 1
//! ```
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{EegError, Result};
use crate::events::Protocol;

/// On-disk sample encoding for the raw binary formats.  All are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleDtype {
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleDtype {
    /// Parse a `data_format` string (`int16`, `<i2`, `float32`, …).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().trim_matches('\'').to_ascii_lowercase().as_str() {
            "int16" | "i2" | "<i2" | "short" => Ok(SampleDtype::Int16),
            "int32" | "i4" | "<i4" | "int" => Ok(SampleDtype::Int32),
            "float32" | "f4" | "<f4" | "single" => Ok(SampleDtype::Float32),
            "float64" | "f8" | "<f8" | "double" => Ok(SampleDtype::Float64),
            other => Err(EegError::UnsupportedFormat(format!("sample dtype {other:?}"))),
        }
    }

    pub fn item_size(&self) -> usize {
        match self {
            SampleDtype::Int16 => 2,
            SampleDtype::Int32 | SampleDtype::Float32 => 4,
            SampleDtype::Float64 => 8,
        }
    }

    /// Decode a little-endian byte run into `out` (cleared first).
    pub fn decode_into(&self, bytes: &[u8], out: &mut Vec<f64>) {
        out.clear();
        match self {
            SampleDtype::Int16 => out.extend(
                bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]) as f64),
            ),
            SampleDtype::Int32 => out.extend(
                bytes.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64),
            ),
            SampleDtype::Float32 => out.extend(
                bytes.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64),
            ),
            SampleDtype::Float64 => out.extend(
                bytes.chunks_exact(8).map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                }),
            ),
        }
    }
}

/// Collapsed metadata for one session's recordings.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesInfo {
    /// Hz.
    pub sample_rate: f64,
    /// Either a [`SampleDtype`] name or, for scalp EEG, a file extension such
    /// as `.bdf`.
    pub data_format: String,
    pub n_samples: Option<u64>,
    pub path: PathBuf,
    /// All collapsed fields, including the typed ones above.
    pub extra: Map<String, Value>,
}

impl SourcesInfo {
    /// Read metadata using the format appropriate for `protocol`.
    pub fn from_file(path: &Path, protocol: Protocol) -> Result<Self> {
        if protocol.uses_sources_json() {
            Self::from_sources_json(path)
        } else {
            Self::from_params_txt(path)
        }
    }

    pub fn from_sources_json(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let root: Map<String, Value> = serde_json::from_slice(&bytes)?;
        let extra = collapse_recordings(&root);

        let sample_rate = match extra.get("sample_rate") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::Array(_)) => {
                return Err(EegError::InvalidInput(format!(
                    "{}: recordings disagree on sample_rate",
                    path.display()
                )))
            }
            _ => None,
        }
        .ok_or_else(|| EegError::MissingData(format!("{}: no sample_rate", path.display())))?;

        let data_format = extra
            .get("data_format")
            .and_then(Value::as_str)
            .ok_or_else(|| EegError::MissingData(format!("{}: no single data_format", path.display())))?
            .to_string();

        let n_samples = extra.get("n_samples").and_then(Value::as_u64);

        Ok(Self { sample_rate, data_format, n_samples, path: path.to_path_buf(), extra })
    }

    pub fn from_params_txt(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut extra = Map::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let value = value.trim_matches('\'');
            let json = value
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(value.to_string()));
            extra.insert(key.to_string(), json);
        }

        let sample_rate = extra
            .get("samplerate")
            .and_then(Value::as_f64)
            .ok_or_else(|| EegError::MissingData(format!("{}: no samplerate", path.display())))?;
        let data_format = extra
            .get("dataformat")
            .and_then(Value::as_str)
            .ok_or_else(|| EegError::MissingData(format!("{}: no dataformat", path.display())))?
            .to_string();

        Ok(Self { sample_rate, data_format, n_samples: None, path: path.to_path_buf(), extra })
    }

    /// Scalp recordings are described by their file extension.
    pub fn is_scalp(&self) -> bool {
        matches!(self.data_format.as_str(), ".bdf" | ".raw" | ".mff")
    }
}

fn collapse_recordings(root: &Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<&String> = Vec::new();
    for rec in root.values().filter_map(Value::as_object) {
        for k in rec.keys() {
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
    }

    let mut out = Map::new();
    for key in keys {
        let values: Vec<&Value> = root
            .values()
            .filter_map(|r| r.get(key.as_str()))
            .collect();
        if values.iter().any(|v| v.is_object()) {
            continue;
        }
        let mut unique: Vec<Value> = Vec::new();
        for v in values {
            if !unique.contains(v) {
                unique.push(v.clone());
            }
        }
        let collapsed = if unique.len() == 1 { unique.remove(0) } else { Value::Array(unique) };
        out.insert(key.clone(), collapsed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sources_json_collapses_shared_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"{
              "a": {"data_format": "int16", "sample_rate": 1000, "n_samples": 10, "name": "a"},
              "b": {"data_format": "int16", "sample_rate": 1000, "n_samples": 20, "name": "b"}
            }"#,
        )
        .unwrap();
        let info = SourcesInfo::from_sources_json(&path).unwrap();
        assert_eq!(info.sample_rate, 1000.0);
        assert_eq!(info.data_format, "int16");
        assert_eq!(info.n_samples, None);
        assert_eq!(info.extra["n_samples"], serde_json::json!([10, 20]));
    }

    #[test]
    fn params_txt_strips_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "samplerate 256\ndataformat 'int16'\ngain 1").unwrap();
        let info = SourcesInfo::from_params_txt(&path).unwrap();
        assert_eq!(info.sample_rate, 256.0);
        assert_eq!(info.data_format, "int16");
    }

    #[test]
    fn dtype_decode() {
        let mut out = Vec::new();
        let bytes: Vec<u8> = [-2i16, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        SampleDtype::parse("int16").unwrap().decode_into(&bytes, &mut out);
        assert_eq!(out, vec![-2.0, 7.0]);
        assert!(SampleDtype::parse(".bdf").is_err());
    }
}

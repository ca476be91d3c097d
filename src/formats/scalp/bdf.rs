//! BioSemi BDF: the 24-bit variant of EDF.
//!
//! Header: 256 bytes of fixed ASCII fields followed by 256 bytes per signal,
//! laid out field-by-field (all labels, then all transducers, …).  Data
//! records hold, for each signal in turn, `samples_per_record` little-endian
//! 24-bit two's-complement samples.
//!
//! Physical value: `bit_value × (offset + digital)` with
//! `bit_value = (phys_max − phys_min) / (dig_max − dig_min)` and
//! `offset = phys_max / bit_value − dig_max`.  Microvolt signals are
//! converted to volts.
use std::path::Path;

use anyhow::{bail, ensure, Context};
use ndarray::Array2;

use super::{ChannelType, ContinuousRecording};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Signal {
    label: String,
    unit: String,
    physical_min: f64,
    physical_max: f64,
    digital_min: i32,
    digital_max: i32,
    samples_per_record: usize,
}

impl Signal {
    fn bit_value(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    fn offset(&self) -> f64 {
        self.physical_max / self.bit_value() - self.digital_max as f64
    }

    fn unit_scale(&self) -> f64 {
        match self.unit.as_str() {
            "uV" | "µV" => 1e-6,
            "mV" => 1e-3,
            _ => 1.0,
        }
    }

    fn is_annotation(&self) -> bool {
        self.label.ends_with("Annotations")
    }
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn field<T: std::str::FromStr>(bytes: &[u8], what: &str) -> anyhow::Result<T> {
    let s = ascii(bytes);
    s.parse::<T>().map_err(|_| anyhow::anyhow!("BDF header: bad {what} {s:?}"))
}

/// Channel type by BioSemi naming: EXG1–4 are EOG, EXG5–8 misc, `Status`
/// the trigger channel.
pub fn biosemi_channel_type(label: &str) -> ChannelType {
    match label {
        "EXG1" | "EXG2" | "EXG3" | "EXG4" => ChannelType::Eog,
        "EXG5" | "EXG6" | "EXG7" | "EXG8" => ChannelType::Misc,
        "Status" => ChannelType::Stim,
        _ => ChannelType::Eeg,
    }
}

fn parse_bdf(bytes: &[u8]) -> anyhow::Result<ContinuousRecording> {
    ensure!(bytes.len() >= 256, "BDF header truncated");
    ensure!(bytes[0] == 0xFF && &bytes[1..8] == b"BIOSEMI", "not a BioSemi BDF file");

    let header_len: usize = field(&bytes[184..192], "header size")?;
    let n_records: i64 = field(&bytes[236..244], "record count")?;
    let record_secs: f64 = field(&bytes[244..252], "record duration")?;
    let ns: usize = field(&bytes[252..256], "signal count")?;
    ensure!(ns > 0, "BDF file has no signals");
    ensure!(header_len == 256 * (ns + 1), "BDF header size {header_len} for {ns} signals");
    ensure!(bytes.len() >= header_len, "BDF signal headers truncated");
    ensure!(record_secs > 0.0, "BDF record duration must be positive");

    let h = &bytes[256..header_len];
    let at = |offset: usize, width: usize, i: usize| &h[ns * offset + i * width..ns * offset + (i + 1) * width];
    let mut signals = Vec::with_capacity(ns);
    for i in 0..ns {
        signals.push(Signal {
            label: ascii(at(0, 16, i)),
            unit: ascii(at(96, 8, i)),
            physical_min: field(at(104, 8, i), "physical minimum")?,
            physical_max: field(at(112, 8, i), "physical maximum")?,
            digital_min: field(at(120, 8, i), "digital minimum")?,
            digital_max: field(at(128, 8, i), "digital maximum")?,
            samples_per_record: field(at(216, 8, i), "samples per record")?,
        });
    }

    let record_samples: usize = signals.iter().map(|s| s.samples_per_record).sum();
    let record_bytes = record_samples * 3;
    let available = (bytes.len() - header_len) / record_bytes.max(1);
    let n_records = if n_records < 0 {
        available
    } else {
        let n = n_records as usize;
        ensure!(n <= available, "BDF data truncated: {n} records declared, {available} present");
        n
    };

    let keep: Vec<usize> = (0..ns).filter(|&i| !signals[i].is_annotation()).collect();
    ensure!(!keep.is_empty(), "BDF file holds only annotations");
    let spr = signals[keep[0]].samples_per_record;
    if keep.iter().any(|&i| signals[i].samples_per_record != spr) {
        bail!("BDF signals with different sampling rates are not supported");
    }

    let mut data = Array2::<f64>::zeros((keep.len(), n_records * spr));
    for r in 0..n_records {
        let mut pos = header_len + r * record_bytes;
        let mut row = 0;
        for (i, sig) in signals.iter().enumerate() {
            let n = sig.samples_per_record;
            if keep.get(row) != Some(&i) {
                pos += n * 3;
                continue;
            }
            let stim = sig.label == "Status";
            let (bv, off, scale) = (sig.bit_value(), sig.offset(), sig.unit_scale());
            for k in 0..n {
                let b = &bytes[pos + k * 3..pos + k * 3 + 3];
                let digital = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                data[[row, r * spr + k]] = if stim {
                    // Trigger codes live in the low 16 bits.
                    (digital & 0xFFFF) as f64
                } else {
                    bv * (off + digital as f64) * scale
                };
            }
            pos += n * 3;
            row += 1;
        }
    }

    let ch_names: Vec<String> = keep.iter().map(|&i| signals[i].label.clone()).collect();
    Ok(ContinuousRecording {
        data,
        sfreq: spr as f64 / record_secs,
        first_samp: 0,
        ch_types: ch_names.iter().map(|n| biosemi_channel_type(n)).collect(),
        ch_names,
    })
}

pub fn read_bdf(path: &Path) -> Result<ContinuousRecording> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rec = parse_bdf(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(rec)
}

//! EGI "simple binary" (`.raw`) continuous recordings.
//!
//! Big-endian header:
//!
//! ```text
//! version        i32   2 = int16, 4 = float32, 6 = float64; odd = segmented
//! year month day hour minute second   6 × i16
//! millisecond    i32
//! samp_rate n_channels gain bits range   5 × i16
//! n_samples      i32
//! n_events       i16
//! event codes    n_events × 4 ASCII bytes
//! ```
//!
//! followed by `n_samples` frames of `n_channels + n_events` values.  The
//! event tracks become stim channels named after their codes.
use std::path::Path;

use anyhow::{bail, ensure, Context};
use ndarray::Array2;

use super::{ChannelType, ContinuousRecording};
use crate::error::Result;

/// HydroCel 129 channels recorded as EOG.
const EOG_CHANNELS: [&str; 4] = ["E8", "E25", "E126", "E127"];

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        ensure!(self.pos + n <= self.bytes.len(), "EGI header truncated at byte {}", self.pos);
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn i16(&mut self) -> anyhow::Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> anyhow::Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn parse_egi(bytes: &[u8]) -> anyhow::Result<ContinuousRecording> {
    let mut c = Cursor { bytes, pos: 0 };
    let version = c.i32()?;
    ensure!(version & 1 == 0, "segmented EGI files are not supported");
    let item = match version & 6 {
        2 => 2,
        4 => 4,
        6 => 8,
        _ => bail!("unknown EGI version {version}"),
    };
    c.take(6 * 2 + 4)?; // acquisition date and time
    let samp_rate = c.i16()?;
    let n_channels = c.i16()?.max(0) as usize;
    let _gain = c.i16()?;
    let bits = c.i16()?;
    let range = c.i16()?;
    let n_samples = c.i32()?.max(0) as usize;
    let n_events = c.i16()?.max(0) as usize;
    let mut event_codes = Vec::with_capacity(n_events);
    for _ in 0..n_events {
        event_codes.push(String::from_utf8_lossy(c.take(4)?).trim().to_string());
    }
    ensure!(samp_rate > 0, "EGI sampling rate must be positive");

    let width = n_channels + n_events;
    let body = c.take(n_samples * width * item).context("EGI data truncated")?;
    let values: Vec<f64> = match item {
        2 => body.chunks_exact(2).map(|b| i16::from_be_bytes([b[0], b[1]]) as f64).collect(),
        4 => body.chunks_exact(4).map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
        _ => body
            .chunks_exact(8)
            .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
    };
    let frames = Array2::from_shape_vec((n_samples, width), values)?;
    let mut data = frames.reversed_axes().as_standard_layout().to_owned();

    // Integer files carry a range/bits calibration; samples are microvolts.
    let cal = if bits != 0 && range != 0 { range as f64 / 2f64.powi(bits as i32) } else { 1.0 };
    for mut row in data.rows_mut().into_iter().take(n_channels) {
        row *= cal * 1e-6;
    }

    let mut ch_names: Vec<String> = (1..=n_channels).map(|i| format!("E{i}")).collect();
    ch_names.extend(event_codes);
    let mut ch_types = vec![ChannelType::Eeg; n_channels];
    ch_types.extend(std::iter::repeat(ChannelType::Stim).take(n_events));

    let mut rec = ContinuousRecording { data, sfreq: samp_rate as f64, first_samp: 0, ch_names, ch_types };
    rec.rename_channel("E129", "Cz");
    for name in EOG_CHANNELS {
        rec.set_channel_type(name, ChannelType::Eog);
    }
    rec.set_channel_type("Cz", ChannelType::Misc);
    Ok(rec)
}

pub fn read_egi_raw(path: &Path) -> Result<ContinuousRecording> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rec = parse_egi(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(rec)
}

/// Shared helpers: synthetic recordings written to temp dirs.
use std::path::{Path, PathBuf};

use eegio::EventRow;

#[allow(unused)]
/// Three int16 channels: sine, cosine, constant.
pub fn sine_cos_const(n: usize) -> Vec<Vec<i16>> {
    let sine = (0..n).map(|t| (1000.0 * (t as f64 / 10.0).sin()).round() as i16).collect();
    let cos = (0..n).map(|t| (1000.0 * (t as f64 / 10.0).cos()).round() as i16).collect();
    let constant = vec![250i16; n];
    vec![sine, cos, constant]
}

#[allow(unused)]
/// Channel `c` (0-based) holds `c * 1000 + t`.
pub fn ramps(n_ch: usize, n: usize) -> Vec<Vec<i16>> {
    (0..n_ch)
        .map(|c| (0..n).map(|t| (c * 1000 + t) as i16).collect())
        .collect()
}

#[allow(unused)]
/// Write `<dir>/<basename>.001`, `.002`, … as little-endian int16.
pub fn write_split(dir: &Path, basename: &str, channels: &[Vec<i16>]) -> PathBuf {
    for (i, ch) in channels.iter().enumerate() {
        let bytes: Vec<u8> = ch.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(dir.join(format!("{basename}.{:03}", i + 1)), bytes).unwrap();
    }
    dir.join(basename)
}

#[allow(unused)]
/// `sources.json` with a single recording.
pub fn write_sources(dir: &Path, name: &str, sample_rate: f64, data_format: &str, n_samples: usize) -> PathBuf {
    let mut root = serde_json::Map::new();
    root.insert(
        name.to_string(),
        serde_json::json!({
            "sample_rate": sample_rate,
            "data_format": data_format,
            "n_samples": n_samples,
            "name": name,
        }),
    );
    let json = serde_json::Value::Object(root);
    let path = dir.join(format!("{name}_sources.json"));
    std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
    path
}

#[allow(unused)]
pub fn event(subject: &str, eegfile: &Path, offset: i64) -> EventRow {
    EventRow::at_offset(offset).with_source(subject, "FR1", 0, &eegfile.to_string_lossy())
}

fn ascii_field(out: &mut Vec<u8>, value: &str, width: usize) {
    let mut b = value.as_bytes().to_vec();
    b.resize(width, b' ');
    out.extend_from_slice(&b);
}

#[allow(unused)]
/// BioSemi BDF with one-second records.  Physical and digital ranges are
/// equal and the unit is `V`, so samples read back unscaled.
pub fn write_bdf(path: &Path, labels: &[&str], rate: usize, channels: &[Vec<i32>]) {
    let ns = labels.len();
    let n_records = channels[0].len() / rate;
    let mut out = vec![0xFFu8];
    out.extend_from_slice(b"BIOSEMI");
    ascii_field(&mut out, "test", 80);
    ascii_field(&mut out, "test", 80);
    ascii_field(&mut out, "01.01.20", 8);
    ascii_field(&mut out, "00.00.00", 8);
    ascii_field(&mut out, &(256 * (ns + 1)).to_string(), 8);
    ascii_field(&mut out, "24BIT", 44);
    ascii_field(&mut out, &n_records.to_string(), 8);
    ascii_field(&mut out, "1", 8);
    ascii_field(&mut out, &ns.to_string(), 4);

    let each = |out: &mut Vec<u8>, value: &str, width: usize| {
        for _ in 0..ns {
            ascii_field(out, value, width);
        }
    };
    for l in labels {
        ascii_field(&mut out, l, 16);
    }
    each(&mut out, "", 80);
    each(&mut out, "V", 8);
    each(&mut out, "-8388608", 8);
    each(&mut out, "8388607", 8);
    each(&mut out, "-8388608", 8);
    each(&mut out, "8388607", 8);
    each(&mut out, "", 80);
    each(&mut out, &rate.to_string(), 8);
    each(&mut out, "", 32);

    for r in 0..n_records {
        for ch in channels {
            for &v in &ch[r * rate..(r + 1) * rate] {
                out.extend_from_slice(&v.to_le_bytes()[..3]);
            }
        }
    }
    std::fs::write(path, out).unwrap();
}

#[allow(unused)]
/// EGI simple binary, float32 samples (microvolts).
pub fn write_egi(path: &Path, rate: i16, channels: &[Vec<f32>]) {
    let n_samples = channels[0].len();
    let mut out = Vec::new();
    out.extend_from_slice(&4i32.to_be_bytes());
    for v in [2020i16, 1, 1, 0, 0, 0] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&0i32.to_be_bytes());
    for v in [rate, channels.len() as i16, 1, 0, 0] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&(n_samples as i32).to_be_bytes());
    out.extend_from_slice(&0i16.to_be_bytes());
    for t in 0..n_samples {
        for ch in channels {
            out.extend_from_slice(&ch[t].to_be_bytes());
        }
    }
    std::fs::write(path, out).unwrap();
}

fn fif_tag(out: &mut Vec<u8>, kind: i32, ftype: u32, payload: &[u8], last: bool) {
    out.extend_from_slice(&kind.to_be_bytes());
    out.extend_from_slice(&ftype.to_be_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    out.extend_from_slice(&(if last { -1i32 } else { 0 }).to_be_bytes());
    out.extend_from_slice(payload);
}

#[allow(unused)]
/// FIFF raw file: EEG channels with unit calibration, one float buffer,
/// column 0 at absolute sample `first_samp`.
pub fn write_fif(path: &Path, first_samp: i32, sfreq: f32, names: &[&str], channels: &[Vec<f32>]) {
    const BLOCK_START: i32 = 104;
    const BLOCK_END: i32 = 105;
    let (int, float) = (3u32, 4u32);
    let mut b = Vec::new();
    fif_tag(&mut b, BLOCK_START, int, &100i32.to_be_bytes(), false);
    fif_tag(&mut b, BLOCK_START, int, &101i32.to_be_bytes(), false);
    fif_tag(&mut b, 200, int, &(names.len() as i32).to_be_bytes(), false);
    fif_tag(&mut b, 201, float, &sfreq.to_be_bytes(), false);
    for name in names {
        let mut ch = vec![0u8; 96];
        ch[8..12].copy_from_slice(&2i32.to_be_bytes());
        ch[12..16].copy_from_slice(&1f32.to_be_bytes());
        ch[16..20].copy_from_slice(&1f32.to_be_bytes());
        ch[80..80 + name.len()].copy_from_slice(name.as_bytes());
        fif_tag(&mut b, 203, 30, &ch, false);
    }
    fif_tag(&mut b, BLOCK_END, int, &101i32.to_be_bytes(), false);
    fif_tag(&mut b, BLOCK_START, int, &102i32.to_be_bytes(), false);
    fif_tag(&mut b, 208, int, &first_samp.to_be_bytes(), false);
    let payload: Vec<u8> = (0..channels[0].len())
        .flat_map(|t| channels.iter().map(move |ch| ch[t]))
        .flat_map(|v| v.to_be_bytes())
        .collect();
    fif_tag(&mut b, 300, float, &payload, false);
    fif_tag(&mut b, BLOCK_END, int, &102i32.to_be_bytes(), false);
    fif_tag(&mut b, BLOCK_END, int, &100i32.to_be_bytes(), true);
    std::fs::write(path, b).unwrap();
}

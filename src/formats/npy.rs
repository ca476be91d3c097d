//! Dense `[channel, time]` matrices stored as NumPy `.npy`.
//!
//! Layout: magic `\x93NUMPY`, version byte pair, header length (`u16` for
//! v1, `u32` for v2/v3), then a Python dict literal such as
//! `{'descr': '<f8', 'fortran_order': False, 'shape': (4, 1000), }`
//! padded with spaces to a 64-byte boundary.
//!
//! No real contact numbers are stored, so channels are numbered `1..=n`.
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context};
use ndarray::{s, Array2, Array3, ShapeBuilder};

use super::{uniform_len, EegFormat, RawChannelBlock, ReaderArgs};
use crate::epoch::Epoch;
use crate::error::Result;
use crate::scheme::ChannelScheme;
use crate::sources::SampleDtype;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, PartialEq)]
struct NpyHeader {
    dtype: SampleDtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn dict_value<'a>(dict: &'a str, key: &str) -> anyhow::Result<&'a str> {
    let needle = format!("'{key}'");
    let at = dict.find(&needle).with_context(|| format!("npy header has no {needle}"))?;
    let rest = dict[at + needle.len()..].trim_start();
    let rest = rest.strip_prefix(':').context("malformed npy header")?.trim_start();
    Ok(rest)
}

fn parse_header(dict: &str) -> anyhow::Result<NpyHeader> {
    let descr = dict_value(dict, "descr")?;
    let descr = descr
        .strip_prefix('\'')
        .and_then(|d| d.split('\'').next())
        .context("npy descr is not a string")?;
    ensure!(!descr.starts_with('>'), "big-endian npy data ({descr}) is not supported");
    let dtype = SampleDtype::parse(descr.trim_start_matches(['<', '|', '=']))
        .map_err(|e| anyhow::anyhow!("npy descr {descr:?}: {e}"))?;

    let fortran_order = dict_value(dict, "fortran_order")?.starts_with("True");

    let shape = dict_value(dict, "shape")?;
    let shape = shape
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .context("npy shape is not a tuple")?;
    let shape = shape
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().with_context(|| format!("npy shape entry {s:?}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(NpyHeader { dtype, fortran_order, shape })
}

/// Load a 2-D `.npy` array as `f64`.
pub fn read_npy(path: &Path) -> anyhow::Result<Array2<f64>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    ensure!(bytes.len() >= 10 && bytes.starts_with(MAGIC), "{} is not an npy file", path.display());

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            ensure!(bytes.len() >= 12, "truncated npy header");
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => bail!("unsupported npy version {v}"),
    };
    let data_start = header_start + header_len;
    ensure!(bytes.len() >= data_start, "truncated npy header");
    let dict = std::str::from_utf8(&bytes[header_start..data_start]).context("npy header is not text")?;
    let header = parse_header(dict)?;

    let [rows, cols] = header.shape[..] else {
        bail!("expected a 2-D array, got shape {:?}", header.shape);
    };
    let need = rows * cols * header.dtype.item_size();
    ensure!(bytes.len() - data_start >= need, "npy data truncated: need {need} bytes");

    let mut values = Vec::with_capacity(rows * cols);
    header.dtype.decode_into(&bytes[data_start..data_start + need], &mut values);
    Ok(Array2::from_shape_vec((rows, cols).set_f(header.fortran_order), values)?)
}

/// Write `data` as a little-endian `<f8` v1 `.npy` file.
pub fn write_npy(path: &Path, data: &Array2<f64>) -> anyhow::Result<()> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        data.nrows(),
        data.ncols()
    );
    // Header (including the trailing newline) ends on a 64-byte boundary.
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    let header = format!("{dict}{}\n", " ".repeat(pad));

    let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    f.write_all(MAGIC)?;
    f.write_all(&[1, 0])?;
    f.write_all(&(header.len() as u16).to_le_bytes())?;
    f.write_all(header.as_bytes())?;
    for v in data.iter() {
        f.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

pub struct NpyReader {
    path: PathBuf,
    epochs: Vec<Epoch>,
    scheme: Option<ChannelScheme>,
}

impl NpyReader {
    pub fn new(args: ReaderArgs) -> Self {
        Self { path: args.path, epochs: args.epochs, scheme: args.scheme }
    }
}

impl EegFormat for NpyReader {
    fn read(&mut self) -> Result<RawChannelBlock> {
        let raw = read_npy(&self.path)?;
        let (n_ch, n_samples) = raw.dim();

        // A non-positive stop reads to the end.
        let ranges = self
            .epochs
            .iter()
            .map(|e| Epoch::new(e.start, e.stop.filter(|&s| s > 0)).resolve(n_samples))
            .collect::<Result<Vec<_>>>()?;
        let n_t = uniform_len(&ranges)?;

        let mut data = Array3::<f64>::zeros((ranges.len(), n_ch, n_t));
        for (e, r) in ranges.into_iter().enumerate() {
            data.slice_mut(s![e, .., ..]).assign(&raw.slice(s![.., r]));
        }
        let contacts = (1..=n_ch as i64).collect();
        RawChannelBlock::new(data, contacts)
    }

    fn scheme(&self) -> Option<&ChannelScheme> {
        self.scheme.as_ref()
    }
}

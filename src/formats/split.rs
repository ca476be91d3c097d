//! "Split" EEG: raw little-endian samples stored one channel per file.
//!
//! ```text
//! noreref/
//!   R1111M_FR1_0_22Jan16_1638.001   ← contact 1
//!   R1111M_FR1_0_22Jan16_1638.002   ← contact 2
//!   …
//! ```
//!
//! The numeric suffix is the contact number.  Some sessions were split
//! under a slightly different name than the events record; if the literal
//! base name matches nothing, the `_`-separated parts are joined with `*`
//! and matched again.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::Context;
use glob::Pattern;
use ndarray::{s, Array3, ArrayView1};

use super::{uniform_len, EegFormat, RawChannelBlock, ReaderArgs};
use crate::epoch::Epoch;
use crate::error::{EegError, Result};
use crate::scheme::{includes_contact, ChannelScheme};
use crate::sources::SampleDtype;

pub struct SplitReader {
    basename: PathBuf,
    dtype: SampleDtype,
    epochs: Vec<Epoch>,
    scheme: Option<ChannelScheme>,
}

impl SplitReader {
    pub fn new(args: ReaderArgs) -> Result<Self> {
        Ok(Self {
            dtype: SampleDtype::parse(&args.data_format)?,
            basename: args.path,
            epochs: args.epochs,
            scheme: args.scheme,
        })
    }

    /// `(contact, path)` for every channel file, ordered by contact.
    pub fn channel_files(&self) -> Result<Vec<(i64, PathBuf)>> {
        let dir = match self.basename.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = self
            .basename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = find_channel_files(&dir, &channel_pattern(&[&name])?)?;
        if files.is_empty() {
            let relaxed = channel_pattern(&name.split('_').collect::<Vec<_>>())?;
            tracing::debug!(%name, %relaxed, "no split files under literal name; retrying");
            files = find_channel_files(&dir, &relaxed)?;
        }
        if files.is_empty() {
            return Err(EegError::NamingMismatch { path: self.basename.clone() });
        }
        files.sort_by_key(|(c, _)| *c);
        Ok(files)
    }
}

impl EegFormat for SplitReader {
    fn read(&mut self) -> Result<RawChannelBlock> {
        let files: Vec<(i64, PathBuf)> = self
            .channel_files()?
            .into_iter()
            .filter(|(c, _)| includes_contact(self.scheme.as_ref(), *c))
            .collect();

        let item = self.dtype.item_size();
        let n_ep = self.epochs.len();
        let n_ch = files.len();
        let mut data: Option<Array3<f64>> = None;
        let mut contacts = Vec::with_capacity(n_ch);
        let mut bytes = Vec::new();
        let mut samples = Vec::new();

        for (ch, (contact, path)) in files.iter().enumerate() {
            // The handle lives for this iteration only.
            let mut file = File::open(path)?;
            let n_samples = file.metadata()?.len() as usize / item;
            let ranges = self
                .epochs
                .iter()
                .map(|e| e.resolve(n_samples))
                .collect::<Result<Vec<_>>>()?;
            let n_t = uniform_len(&ranges)?;

            let out = data.get_or_insert_with(|| Array3::zeros((n_ep, n_ch, n_t)));
            if out.dim().2 != n_t {
                return Err(EegError::RaggedEpochs(vec![out.dim().2, n_t]));
            }

            for (e, r) in ranges.iter().enumerate() {
                file.seek(SeekFrom::Start((r.start * item) as u64))?;
                bytes.resize(r.len() * item, 0);
                file.read_exact(&mut bytes)?;
                self.dtype.decode_into(&bytes, &mut samples);
                out.slice_mut(s![e, ch, ..]).assign(&ArrayView1::from(&samples[..]));
            }
            contacts.push(*contact);
        }

        tracing::debug!(basename = %self.basename.display(), channels = n_ch, epochs = n_ep, "read split EEG");
        let data = data.unwrap_or_else(|| Array3::zeros((n_ep, 0, 0)));
        RawChannelBlock::new(data, contacts)
    }

    fn scheme(&self) -> Option<&ChannelScheme> {
        self.scheme.as_ref()
    }
}

/// `<parts joined by *>.*`, with each part matched literally.
fn channel_pattern(parts: &[&str]) -> Result<Pattern> {
    let stem = parts.iter().map(|p| Pattern::escape(p)).collect::<Vec<_>>().join("*");
    Ok(Pattern::new(&format!("{stem}.*")).with_context(|| format!("channel file pattern {stem:?}"))?)
}

/// Siblings in `dir` matching `pattern` whose last suffix is a number.
fn find_channel_files(dir: &Path, pattern: &Pattern) -> Result<Vec<(i64, PathBuf)>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !pattern.matches(&name) {
            continue;
        }
        let Some(contact) = name.rsplit('.').next().and_then(|s| s.parse::<i64>().ok()) else {
            continue;
        };
        out.push((contact, entry.path()));
    }
    Ok(out)
}

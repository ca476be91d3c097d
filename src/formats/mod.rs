//! On-disk EEG formats behind one reader contract.
//!
//! | Suffix                  | Variant                      |
//! |-------------------------|------------------------------|
//! | `.h5`                   | [`ContainerReader`]          |
//! | `.bdf` / `.mff` / `.raw`| [`ScalpReader`]              |
//! | `.npy`                  | [`NpyReader`]                |
//! | anything else           | [`SplitReader`] (one file per channel) |
//!
//! Every reader turns a list of [`Epoch`]s into a [`RawChannelBlock`]
//! (`[E, C, T]` plus one contact number per channel).  Rereferencing
//! defaults to [`crate::reference::rereference`]; the structured container
//! overrides it for recordings that were captured bipolar.
pub mod container;
#[cfg(feature = "hdf5")]
pub mod h5;
pub mod npy;
pub mod scalp;
pub mod split;

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::epoch::Epoch;
use crate::error::{EegError, Result};
use crate::reference::{rereference, Rereferenced};
use crate::scheme::ChannelScheme;
use crate::timeseries::Attrs;

pub use container::{ContainerReader, ContainerSource, InMemoryContainer, Orientation};
pub use npy::NpyReader;
pub use scalp::ScalpReader;
pub use split::SplitReader;

/// Raw read result.
#[derive(Debug, Clone)]
pub struct RawChannelBlock {
    /// `[epochs, channels, time]`.
    pub data: Array3<f64>,
    /// Contact number of each channel, in file order.
    pub contacts: Vec<i64>,
    /// Channel names, for formats that carry them (scalp EEG).
    pub names: Option<Vec<String>>,
}

impl RawChannelBlock {
    pub fn new(data: Array3<f64>, contacts: Vec<i64>) -> Result<Self> {
        if contacts.len() != data.dim().1 {
            return Err(EegError::DimensionMismatch(format!(
                "{} contacts for {} channels",
                contacts.len(),
                data.dim().1
            )));
        }
        Ok(Self { data, contacts, names: None })
    }

    pub fn n_channels(&self) -> usize {
        self.data.dim().1
    }
}

/// Constructor arguments shared by all readers.
#[derive(Debug, Clone)]
pub struct ReaderArgs {
    /// File (or split-file base name) to read.
    pub path: PathBuf,
    /// `data_format` from the recording metadata.
    pub data_format: String,
    pub epochs: Vec<Epoch>,
    pub scheme: Option<ChannelScheme>,
    /// Load the cleaned variant where one exists (scalp EEG only).
    pub clean: bool,
}

impl ReaderArgs {
    pub fn new(path: impl Into<PathBuf>, data_format: impl Into<String>, epochs: Vec<Epoch>) -> Self {
        Self {
            path: path.into(),
            data_format: data_format.into(),
            epochs,
            scheme: None,
            clean: false,
        }
    }

    pub fn with_scheme(mut self, scheme: Option<ChannelScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// Shared reader capability.
pub trait EegFormat {
    /// Read every epoch.
    fn read(&mut self) -> Result<RawChannelBlock>;

    fn scheme(&self) -> Option<&ChannelScheme>;

    /// Rereference (or subset) a block returned by [`read`](EegFormat::read).
    fn rereference(&self, block: &RawChannelBlock) -> Result<Rereferenced> {
        let scheme = self.scheme().ok_or_else(|| {
            EegError::IncompatibleParameters("rereferencing requires a scheme".into())
        })?;
        rereference(&block.data, &block.contacts, scheme)
    }

    /// Whether monopolar data is available to derive arbitrary pairs from.
    fn rereferencing_possible(&self) -> bool {
        true
    }

    /// Format-specific metadata to attach to the result.
    fn attrs(&self) -> Attrs {
        Attrs::new()
    }
}

/// Format family, chosen purely from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Container,
    Scalp,
    Npy,
    Split,
}

impl FormatKind {
    pub fn from_filename(name: &str) -> Self {
        if name.ends_with(".h5") {
            FormatKind::Container
        } else if name.ends_with(".bdf") || name.ends_with(".mff") || name.ends_with(".raw") {
            FormatKind::Scalp
        } else if name.ends_with(".npy") {
            FormatKind::Npy
        } else {
            FormatKind::Split
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_filename(&path.to_string_lossy())
    }
}

/// Closed set of readers.
pub enum FormatReader {
    Split(SplitReader),
    Container(ContainerReader),
    Npy(NpyReader),
    Scalp(ScalpReader),
}

impl FormatReader {
    /// Pick and construct the reader for `args.path`.
    pub fn open(args: ReaderArgs) -> Result<Self> {
        let kind = FormatKind::from_path(&args.path);
        tracing::debug!(path = %args.path.display(), ?kind, "opening EEG reader");
        Ok(match kind {
            FormatKind::Split => FormatReader::Split(SplitReader::new(args)?),
            FormatKind::Container => FormatReader::Container(ContainerReader::open(args)?),
            FormatKind::Npy => FormatReader::Npy(NpyReader::new(args)),
            FormatKind::Scalp => FormatReader::Scalp(ScalpReader::new(args)),
        })
    }

    pub fn kind(&self) -> FormatKind {
        match self {
            FormatReader::Split(_) => FormatKind::Split,
            FormatReader::Container(_) => FormatKind::Container,
            FormatReader::Npy(_) => FormatKind::Npy,
            FormatReader::Scalp(_) => FormatKind::Scalp,
        }
    }

    fn inner(&self) -> &dyn EegFormat {
        match self {
            FormatReader::Split(r) => r,
            FormatReader::Container(r) => r,
            FormatReader::Npy(r) => r,
            FormatReader::Scalp(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn EegFormat {
        match self {
            FormatReader::Split(r) => r,
            FormatReader::Container(r) => r,
            FormatReader::Npy(r) => r,
            FormatReader::Scalp(r) => r,
        }
    }

    pub fn read(&mut self) -> Result<RawChannelBlock> {
        self.inner_mut().read()
    }

    pub fn rereference(&self, block: &RawChannelBlock) -> Result<Rereferenced> {
        self.inner().rereference(block)
    }

    pub fn rereferencing_possible(&self) -> bool {
        self.inner().rereferencing_possible()
    }

    pub fn attrs(&self) -> Attrs {
        self.inner().attrs()
    }

    /// Epochs dropped from the start and end of the request because they ran
    /// past the recording (scalp EEG only; `(0, 0)` otherwise).
    pub fn truncation(&self) -> (usize, usize) {
        match self {
            FormatReader::Scalp(r) => r.truncation(),
            _ => (0, 0),
        }
    }
}

/// All epochs must resolve to ranges of one length.
pub(crate) fn uniform_len(ranges: &[std::ops::Range<usize>]) -> Result<usize> {
    let lens: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
    match lens.first() {
        None => Ok(0),
        Some(&n) if lens.iter().all(|&l| l == n) => Ok(n),
        Some(_) => Err(EegError::RaggedEpochs(lens)),
    }
}

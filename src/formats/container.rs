//! Single-file structured container (`.h5`).
//!
//! ```text
//! /timeseries            samples; attribute `orient` = "row" → [T, C], else [C, T]
//! /ports                 contact number per recorded channel
//! /monopolar_possible    [u8; 1]; absent in older monopolar-only files
//! /bipolar_info/ch0_label, /bipolar_info/ch1_label
//!                        contact pair per recorded channel (bipolar recordings)
//! ```
//!
//! Some recordings list the same pair twice (possibly reversed).  Only the
//! first occurrence in file order is read.
//!
//! The on-disk backend sits behind [`ContainerSource`]; the HDF5 one needs
//! the `hdf5` feature, and [`InMemoryContainer`] serves tests and callers that
//! already hold the arrays.
use std::ops::Range;
use std::path::PathBuf;

use ndarray::{s, Array2, Array3, Axis};

use super::{uniform_len, EegFormat, RawChannelBlock, ReaderArgs};
use crate::epoch::Epoch;
use crate::error::{EegError, Result};
use crate::reference::{rereference, Rereferenced};
use crate::scheme::ChannelScheme;
use crate::timeseries::Attrs;

/// On-disk axis order of the `timeseries` dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// `[time, channel]`.
    Row,
    /// `[channel, time]`.
    #[default]
    Column,
}

impl Orientation {
    /// Parse the `orient` attribute; anything but `row` is column-major.
    pub fn from_attr(value: &str) -> Self {
        if value.trim_matches(char::from(0)).trim() == "row" {
            Orientation::Row
        } else {
            Orientation::Column
        }
    }
}

/// Raw access to a structured container.
pub trait ContainerSource {
    /// The `monopolar_possible` flag, `None` when the file predates it.
    fn monopolar_possible(&self) -> Result<Option<bool>>;

    /// Recorded bipolar pair of each channel, `None` when not stored.
    fn bipolar_pairs(&self) -> Result<Option<Vec<(i64, i64)>>>;

    /// Contact number of each recorded channel.
    fn ports(&self) -> Result<Vec<i64>>;

    fn orientation(&self) -> Result<Orientation>;

    fn n_samples(&self) -> Result<usize>;

    /// All channels over `range`, as `[channel, time]`.
    fn read_time_slice(&self, range: Range<usize>) -> Result<Array2<f64>>;
}

/// Container held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryContainer {
    /// Stored in `orientation` order.
    timeseries: Array2<f64>,
    orientation: Orientation,
    ports: Vec<i64>,
    bipolar_pairs: Option<Vec<(i64, i64)>>,
    monopolar_possible: Option<bool>,
}

impl InMemoryContainer {
    /// `data` is `[channel, time]`; one port per channel.
    pub fn new(data: Array2<f64>, ports: Vec<i64>) -> Result<Self> {
        if ports.len() != data.nrows() {
            return Err(EegError::DimensionMismatch(format!(
                "{} ports for {} channels",
                ports.len(),
                data.nrows()
            )));
        }
        Ok(Self {
            timeseries: data,
            orientation: Orientation::Column,
            ports,
            bipolar_pairs: None,
            monopolar_possible: None,
        })
    }

    /// Store the samples transposed when `Row` is requested.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        if orientation != self.orientation {
            self.timeseries = self.timeseries.t().to_owned();
            self.orientation = orientation;
        }
        self
    }

    pub fn with_bipolar_pairs(mut self, pairs: Vec<(i64, i64)>) -> Self {
        self.bipolar_pairs = Some(pairs);
        self
    }

    pub fn with_monopolar_possible(mut self, possible: bool) -> Self {
        self.monopolar_possible = Some(possible);
        self
    }
}

impl ContainerSource for InMemoryContainer {
    fn monopolar_possible(&self) -> Result<Option<bool>> {
        Ok(self.monopolar_possible)
    }

    fn bipolar_pairs(&self) -> Result<Option<Vec<(i64, i64)>>> {
        Ok(self.bipolar_pairs.clone())
    }

    fn ports(&self) -> Result<Vec<i64>> {
        Ok(self.ports.clone())
    }

    fn orientation(&self) -> Result<Orientation> {
        Ok(self.orientation)
    }

    fn n_samples(&self) -> Result<usize> {
        Ok(match self.orientation {
            Orientation::Row => self.timeseries.nrows(),
            Orientation::Column => self.timeseries.ncols(),
        })
    }

    fn read_time_slice(&self, range: Range<usize>) -> Result<Array2<f64>> {
        Ok(match self.orientation {
            Orientation::Row => self.timeseries.slice(s![range, ..]).t().to_owned(),
            Orientation::Column => self.timeseries.slice(s![.., range]).to_owned(),
        })
    }
}

/// `keep[i]` is false when pair `i` (in either order) already appeared
/// earlier.
pub fn duplicate_keep_mask(pairs: &[(i64, i64)]) -> Vec<bool> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, &(a, b))| {
            !pairs[..i]
                .iter()
                .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
        })
        .collect()
}

pub struct ContainerReader {
    path: PathBuf,
    epochs: Vec<Epoch>,
    scheme: Option<ChannelScheme>,
    source: Box<dyn ContainerSource>,
    rereferencing_possible: bool,
    /// Recorded pairs that survive de-duplication, in file order.
    kept_pairs: Option<Vec<(i64, i64)>>,
    keep: Vec<bool>,
}

impl ContainerReader {
    /// Open `args.path` with the HDF5 backend.
    #[cfg(feature = "hdf5")]
    pub fn open(args: ReaderArgs) -> Result<Self> {
        let source = super::h5::Hdf5Container::open(&args.path)?;
        Self::from_source(Box::new(source), args)
    }

    #[cfg(not(feature = "hdf5"))]
    pub fn open(args: ReaderArgs) -> Result<Self> {
        Err(EegError::UnsupportedFormat(format!(
            "{}: HDF5 support requires the `hdf5` feature",
            args.path.display()
        )))
    }

    pub fn from_source(source: Box<dyn ContainerSource>, args: ReaderArgs) -> Result<Self> {
        // Older files only ever held monopolar channels.
        let rereferencing_possible = source.monopolar_possible()?.unwrap_or(true);
        let n_ports = source.ports()?.len();

        let (keep, kept_pairs) = match source.bipolar_pairs()? {
            Some(pairs) => {
                if pairs.len() != n_ports {
                    return Err(EegError::DimensionMismatch(format!(
                        "{} bipolar pairs for {n_ports} channels",
                        pairs.len()
                    )));
                }
                let keep = duplicate_keep_mask(&pairs);
                let dropped = keep.iter().filter(|k| !**k).count();
                if dropped > 0 {
                    tracing::debug!(path = %args.path.display(), dropped, "skipping duplicated bipolar pairs");
                }
                let kept = pairs.into_iter().zip(&keep).filter(|(_, k)| **k).map(|(p, _)| p).collect();
                (keep, Some(kept))
            }
            None => (vec![true; n_ports], None),
        };

        Ok(Self {
            path: args.path,
            epochs: args.epochs,
            scheme: args.scheme,
            source,
            rereferencing_possible,
            kept_pairs,
            keep,
        })
    }

    /// Recorded pairs after de-duplication, aligned with the channels
    /// returned by [`read`](EegFormat::read).
    pub fn recorded_pairs(&self) -> Option<&[(i64, i64)]> {
        self.kept_pairs.as_deref()
    }

    fn kept_indices(&self) -> Vec<usize> {
        self.keep.iter().enumerate().filter(|(_, k)| **k).map(|(i, _)| i).collect()
    }

    /// Pick already-bipolar rows matching the scheme's pairs.
    fn select_recorded_pairs(&self, block: &RawChannelBlock, scheme: &ChannelScheme) -> Result<Rereferenced> {
        let ChannelScheme::Pairs(wanted) = scheme else {
            return rereference(&block.data, &block.contacts, scheme);
        };
        let recorded = self.kept_pairs.as_deref().ok_or_else(|| {
            EegError::RereferencingNotPossible(format!(
                "{}: monopolar data unavailable and no bipolar pairs recorded",
                self.path.display()
            ))
        })?;
        if recorded.len() != block.n_channels() {
            return Err(EegError::DimensionMismatch(format!(
                "{} recorded pairs for {} channels",
                recorded.len(),
                block.n_channels()
            )));
        }

        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut missing = Vec::new();
        for p in wanted {
            match recorded.iter().position(|&(a, b)| p.matches(a, b)) {
                Some(i) => {
                    rows.push(i);
                    labels.push(p.label.clone());
                }
                None => missing.push(p.label.clone()),
            }
        }

        if rows.is_empty() {
            return Err(EegError::RereferencingNotPossible(
                "no channels specified in scheme are present in EEG recording".into(),
            ));
        }
        if !missing.is_empty() {
            tracing::warn!("the following channels are missing: {}", missing.join(", "));
        }

        let data = block.data.select(Axis(1), &rows);
        Ok(Rereferenced { data, labels, missing })
    }
}

impl EegFormat for ContainerReader {
    fn read(&mut self) -> Result<RawChannelBlock> {
        let n_samples = self.source.n_samples()?;
        let ranges = self
            .epochs
            .iter()
            .map(|e| e.resolve(n_samples))
            .collect::<Result<Vec<_>>>()?;
        let n_t = uniform_len(&ranges)?;
        let idx = self.kept_indices();

        let mut data = Array3::<f64>::zeros((ranges.len(), idx.len(), n_t));
        for (e, r) in ranges.into_iter().enumerate() {
            let slice = self.source.read_time_slice(r)?;
            data.index_axis_mut(Axis(0), e).assign(&slice.select(Axis(0), &idx));
        }

        let ports = self.source.ports()?;
        let contacts = idx.iter().map(|&i| ports[i]).collect();
        tracing::debug!(path = %self.path.display(), channels = idx.len(), epochs = data.dim().0, "read container EEG");
        RawChannelBlock::new(data, contacts)
    }

    fn scheme(&self) -> Option<&ChannelScheme> {
        self.scheme.as_ref()
    }

    fn rereference(&self, block: &RawChannelBlock) -> Result<Rereferenced> {
        let scheme = self.scheme.as_ref().ok_or_else(|| {
            EegError::IncompatibleParameters("rereferencing requires a scheme".into())
        })?;
        if self.rereferencing_possible {
            return rereference(&block.data, &block.contacts, scheme);
        }
        self.select_recorded_pairs(block, scheme)
    }

    fn rereferencing_possible(&self) -> bool {
        self.rereferencing_possible
    }

    fn attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        if let Ok(o) = self.source.orientation() {
            attrs.insert("orient", if o == Orientation::Row { "row" } else { "column" });
        }
        attrs
    }
}

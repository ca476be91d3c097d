//! HDF5 backend for [`ContainerReader`](super::ContainerReader).
use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use hdf5::types::VarLenUnicode;
use ndarray::Array2;

use super::container::{ContainerSource, Orientation};
use crate::error::Result;

pub struct Hdf5Container {
    file: hdf5::File,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self> {
        let file = hdf5::File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self { file })
    }

    fn timeseries(&self) -> Result<hdf5::Dataset> {
        Ok(self.file.dataset("timeseries").context("dataset /timeseries")?)
    }
}

/// Labels are stored either as integers or as numeric strings.
fn read_labels(ds: &hdf5::Dataset) -> anyhow::Result<Vec<i64>> {
    if let Ok(v) = ds.read_raw::<i64>() {
        return Ok(v);
    }
    ds.read_raw::<VarLenUnicode>()?
        .iter()
        .map(|s| {
            s.as_str()
                .trim()
                .parse::<i64>()
                .with_context(|| format!("non-numeric channel label {:?}", s.as_str()))
        })
        .collect()
}

impl ContainerSource for Hdf5Container {
    fn monopolar_possible(&self) -> Result<Option<bool>> {
        if !self.file.link_exists("monopolar_possible") {
            return Ok(None);
        }
        let flag = self
            .file
            .dataset("monopolar_possible")
            .and_then(|d| d.read_raw::<i64>())
            .context("read /monopolar_possible")?;
        Ok(flag.first().map(|&v| v != 0))
    }

    fn bipolar_pairs(&self) -> Result<Option<Vec<(i64, i64)>>> {
        if !self.file.link_exists("bipolar_info") {
            return Ok(None);
        }
        let info = self.file.group("bipolar_info").context("group /bipolar_info")?;
        let ch0 = read_labels(&info.dataset("ch0_label").context("bipolar_info/ch0_label")?)?;
        let ch1 = read_labels(&info.dataset("ch1_label").context("bipolar_info/ch1_label")?)?;
        Ok(Some(ch0.into_iter().zip(ch1).collect()))
    }

    fn ports(&self) -> Result<Vec<i64>> {
        let ds = self.file.dataset("ports").context("dataset /ports")?;
        Ok(ds.read_raw::<i64>().context("read /ports")?)
    }

    fn orientation(&self) -> Result<Orientation> {
        let ds = self.timeseries()?;
        let names = ds.attr_names().context("list /timeseries attributes")?;
        if !names.iter().any(|n| n == "orient") {
            return Ok(Orientation::Column);
        }
        let value = ds
            .attr("orient")
            .and_then(|a| a.read_scalar::<VarLenUnicode>())
            .map(|s| s.as_str().to_string())
            .or_else(|_| {
                ds.attr("orient")
                    .and_then(|a| a.read_raw::<u8>())
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
            })
            .context("read /timeseries orient attribute")?;
        Ok(Orientation::from_attr(&value))
    }

    fn n_samples(&self) -> Result<usize> {
        let shape = self.timeseries()?.shape();
        let orient = self.orientation()?;
        match (shape.as_slice(), orient) {
            ([t, _], Orientation::Row) | ([_, t], Orientation::Column) => Ok(*t),
            _ => Err(anyhow::anyhow!("/timeseries must be 2-D, got {shape:?}").into()),
        }
    }

    fn read_time_slice(&self, range: Range<usize>) -> Result<Array2<f64>> {
        let ds = self.timeseries()?;
        let (data, transpose) = match self.orientation()? {
            Orientation::Row => (ds.read_slice_2d::<f64, _>((range, ..)), true),
            Orientation::Column => (ds.read_slice_2d::<f64, _>((.., range)), false),
        };
        let data = data.context("read /timeseries slice")?;
        let (rows, cols) = data.dim();
        let owned = Array2::from_shape_vec((rows, cols), data.iter().copied().collect())?;
        Ok(if transpose { owned.reversed_axes() } else { owned })
    }
}

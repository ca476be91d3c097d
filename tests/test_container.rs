use eegio::formats::container::duplicate_keep_mask;
use eegio::formats::{ContainerReader, EegFormat, InMemoryContainer, Orientation, ReaderArgs};
use eegio::{ChannelScheme, EegError, Epoch};
use ndarray::{s, Array2};

/// Channel `c` holds `100 * (c + 1) + t`.
fn samples(n_ch: usize, n_t: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_ch, n_t), |(c, t)| (100 * (c + 1) + t) as f64)
}

fn args(scheme: Option<ChannelScheme>) -> ReaderArgs {
    ReaderArgs::new("/data/eeg_timeseries.h5", "", vec![Epoch::new(0, Some(10)), Epoch::new(20, Some(30))])
        .with_scheme(scheme)
}

/// Bipolar recording: four channels, the last repeating the first reversed.
fn bipolar() -> InMemoryContainer {
    InMemoryContainer::new(samples(4, 50), vec![1, 2, 3, 4])
        .unwrap()
        .with_bipolar_pairs(vec![(1, 2), (2, 3), (3, 4), (2, 1)])
        .with_monopolar_possible(false)
}

#[test]
fn duplicates_keep_first_in_file_order() {
    assert_eq!(
        duplicate_keep_mask(&[(1, 2), (2, 1), (3, 4), (1, 2), (4, 3), (5, 6)]),
        vec![true, false, true, false, false, true]
    );
}

#[test]
fn duplicated_channels_are_not_read() {
    let mut reader = ContainerReader::from_source(Box::new(bipolar()), args(None)).unwrap();
    let block = reader.read().unwrap();
    assert_eq!(block.data.dim(), (2, 3, 10));
    assert_eq!(block.contacts, vec![1, 2, 3]);
    assert_eq!(reader.recorded_pairs().unwrap(), &[(1, 2), (2, 3), (3, 4)]);
    assert!(!reader.rereferencing_possible());
}

#[test]
fn row_and_column_orientation_agree() {
    let col = InMemoryContainer::new(samples(3, 40), vec![1, 2, 3]).unwrap();
    let row = col.clone().with_orientation(Orientation::Row);

    let mut a = ContainerReader::from_source(Box::new(col), args(None)).unwrap();
    let mut b = ContainerReader::from_source(Box::new(row), args(None)).unwrap();
    let (da, db) = (a.read().unwrap(), b.read().unwrap());
    assert_eq!(da.data, db.data);
    assert_eq!(da.data[[1, 2, 3]], 323.0);
    assert_eq!(b.attrs().get("orient").and_then(|v| v.as_str()), Some("row"));
}

#[test]
fn missing_flag_means_monopolar() {
    let source = InMemoryContainer::new(samples(3, 40), vec![1, 2, 3]).unwrap();
    let scheme = ChannelScheme::pairs([(1, 3, "1-3")]);
    let mut reader = ContainerReader::from_source(Box::new(source), args(Some(scheme))).unwrap();
    assert!(reader.rereferencing_possible());
    let block = reader.read().unwrap();
    let out = reader.rereference(&block).unwrap();
    assert!(out.data.iter().all(|&v| v == -200.0));
}

#[test]
fn bipolar_recording_selects_recorded_pairs() {
    let scheme = ChannelScheme::pairs([(4, 3, "D-C"), (9, 10, "X-Y"), (1, 2, "A-B")]);
    let mut reader = ContainerReader::from_source(Box::new(bipolar()), args(Some(scheme))).unwrap();
    let block = reader.read().unwrap();
    let out = reader.rereference(&block).unwrap();

    // Rows come back in scheme order, untouched by subtraction.
    assert_eq!(out.labels, vec!["D-C", "A-B"]);
    assert_eq!(out.missing, vec!["X-Y"]);
    assert_eq!(out.data.slice(s![.., 0, ..]), block.data.slice(s![.., 2, ..]));
    assert_eq!(out.data.slice(s![.., 1, ..]), block.data.slice(s![.., 0, ..]));
}

#[test]
fn no_recorded_pair_matches() {
    let scheme = ChannelScheme::pairs([(7, 8, "G-H"), (1, 3, "A-C")]);
    let mut reader = ContainerReader::from_source(Box::new(bipolar()), args(Some(scheme))).unwrap();
    let block = reader.read().unwrap();
    let err = reader.rereference(&block).unwrap_err();
    assert!(matches!(err, EegError::RereferencingNotPossible(_)));
    assert!(err.is_recoverable());
}

#[test]
fn contact_scheme_on_bipolar_recording_selects_ports() {
    let scheme = ChannelScheme::contacts([(2, "B")]);
    let mut reader = ContainerReader::from_source(Box::new(bipolar()), args(Some(scheme))).unwrap();
    let block = reader.read().unwrap();
    let out = reader.rereference(&block).unwrap();
    assert_eq!(out.labels, vec!["B"]);
    assert_eq!(out.data.slice(s![.., 0, ..]), block.data.slice(s![.., 1, ..]));
}

#[test]
fn pair_table_must_match_channels() {
    let source = InMemoryContainer::new(samples(2, 10), vec![1, 2])
        .unwrap()
        .with_bipolar_pairs(vec![(1, 2)]);
    let err = ContainerReader::from_source(Box::new(source), args(None)).err().unwrap();
    assert!(matches!(err, EegError::DimensionMismatch(_)));
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn h5_without_backend_is_unsupported() {
    let err = ContainerReader::open(args(None)).err().unwrap();
    assert!(matches!(err, EegError::UnsupportedFormat(_)));
}

mod common;
use common::{ramps, write_split};
use eegio::formats::{FormatReader, ReaderArgs};
use eegio::{ChannelScheme, EegError, Epoch, FormatKind};

const BASENAME: &str = "R1111M_FR1_0_22Jan16_1638";

#[test]
fn scheme_limits_channels_read() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_split(dir.path(), BASENAME, &ramps(10, 100));
    let scheme = ChannelScheme::pairs([(1, 2, "1-2"), (2, 3, "2-3")]);

    let args = ReaderArgs::new(&base, "int16", vec![Epoch::new(10, Some(20))]).with_scheme(Some(scheme));
    let mut reader = FormatReader::open(args).unwrap();
    assert_eq!(reader.kind(), FormatKind::Split);
    let block = reader.read().unwrap();

    assert_eq!(block.contacts, vec![1, 2, 3]);
    assert_eq!(block.data.dim(), (1, 3, 10));
    assert_eq!(block.data[[0, 2, 0]], 2010.0);
}

#[test]
fn all_channels_without_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_split(dir.path(), BASENAME, &ramps(10, 100));
    let epochs = vec![Epoch::new(0, Some(5)), Epoch::new(50, Some(55)), Epoch::new(95, Some(100))];
    let block = FormatReader::open(ReaderArgs::new(&base, "int16", epochs)).unwrap().read().unwrap();

    assert_eq!(block.contacts, (1..=10).collect::<Vec<_>>());
    assert_eq!(block.data.dim(), (3, 10, 5));
    assert_eq!(block.data[[1, 9, 4]], 9054.0);
    assert_eq!(block.data[[2, 0, 4]], 99.0);
}

#[test]
fn rereference_after_read() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_split(dir.path(), BASENAME, &ramps(4, 30));
    let scheme = ChannelScheme::pairs([(4, 1, "4-1")]);
    let args = ReaderArgs::new(&base, "int16", vec![Epoch::whole()]).with_scheme(Some(scheme));
    let mut reader = FormatReader::open(args).unwrap();
    let block = reader.read().unwrap();
    let out = reader.rereference(&block).unwrap();
    assert!(out.data.iter().all(|&v| v == 3000.0));
    assert!(reader.rereferencing_possible());
}

#[test]
fn renamed_sessions_are_found() {
    let dir = tempfile::tempdir().unwrap();
    write_split(dir.path(), "R1111M_FR1_00_22Jan16_1638", &ramps(2, 10));
    let base = dir.path().join(BASENAME);
    let block = FormatReader::open(ReaderArgs::new(&base, "int16", vec![Epoch::whole()]))
        .unwrap()
        .read()
        .unwrap();
    assert_eq!(block.contacts, vec![1, 2]);
}

#[test]
fn unknown_basename_is_a_naming_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    write_split(dir.path(), BASENAME, &ramps(2, 10));
    let base = dir.path().join("R1222M_catFR1_0");
    let err = FormatReader::open(ReaderArgs::new(&base, "int16", vec![Epoch::whole()]))
        .unwrap()
        .read()
        .unwrap_err();
    assert!(matches!(err, EegError::NamingMismatch { .. }));
}

#[test]
fn epoch_beyond_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_split(dir.path(), BASENAME, &ramps(2, 10));
    let err = FormatReader::open(ReaderArgs::new(&base, "int16", vec![Epoch::new(5, Some(15))]))
        .unwrap()
        .read()
        .unwrap_err();
    assert!(matches!(err, EegError::EpochOutOfRange { .. }));
}

mod common;
use approx::assert_abs_diff_eq;
use common::{write_bdf, write_egi, write_fif};
use eegio::formats::{FormatReader, ReaderArgs};
use eegio::{ChannelScheme, EegError, Epoch, FormatKind};

fn bdf_fixture(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("LTP001_session_0.bdf");
    let channels: Vec<Vec<i32>> = (0..3).map(|c| (0..50).map(|t| c * 100 - t).collect()).collect();
    write_bdf(&path, &["Fp1", "Cz", "EXG1"], 10, &channels);
    path
}

#[test]
fn bdf_epochs_outside_recording_are_trimmed() {
    let dir = tempfile::tempdir().unwrap();
    let path = bdf_fixture(dir.path());
    let epochs = vec![
        Epoch::new(-5, Some(5)),
        Epoch::new(0, Some(10)),
        Epoch::new(20, Some(30)),
        Epoch::new(45, Some(55)),
    ];
    let mut reader = FormatReader::open(ReaderArgs::new(&path, ".bdf", epochs)).unwrap();
    assert_eq!(reader.kind(), FormatKind::Scalp);
    let block = reader.read().unwrap();

    assert_eq!(reader.truncation(), (1, 1));
    assert_eq!(block.data.dim(), (2, 3, 10));
    assert_eq!(block.names.as_deref().unwrap(), ["Fp1", "Cz", "EXG1"]);
    assert_eq!(block.data[[1, 0, 0]], -20.0);
    assert_eq!(block.data[[1, 2, 9]], 200.0 - 29.0);

    let attrs = reader.attrs();
    assert_eq!(attrs.get("truncated_events_pre").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(attrs.get("truncated_events_post").and_then(|v| v.as_u64()), Some(1));
    let info = attrs.get("scalp_info").unwrap();
    assert_eq!(info["sfreq"], 10.0);
    assert_eq!(info["ch_types"][2], "eog");
}

#[test]
fn bdf_whole_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = bdf_fixture(dir.path());
    let mut reader = FormatReader::open(ReaderArgs::new(&path, ".bdf", vec![Epoch::whole()])).unwrap();
    let block = reader.read().unwrap();
    assert_eq!(block.data.dim(), (1, 3, 50));
    assert!(reader.attrs().get("truncated_events_pre").is_none());
}

#[test]
fn scalp_rejects_rereferencing() {
    let dir = tempfile::tempdir().unwrap();
    let path = bdf_fixture(dir.path());
    let scheme = ChannelScheme::pairs([(1, 2, "Fp1-Cz")]);
    let args = ReaderArgs::new(&path, ".bdf", vec![Epoch::whole()]).with_scheme(Some(scheme));
    let mut reader = FormatReader::open(args).unwrap();
    let block = reader.read().unwrap();
    assert!(matches!(reader.rereference(&block), Err(EegError::IncompatibleParameters(_))));
}

#[test]
fn egi_raw_is_scaled_to_volts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("LTP002_session_1.raw");
    let channels: Vec<Vec<f32>> = vec![vec![10.0; 40], (0..40).map(|t| t as f32).collect()];
    write_egi(&path, 500, &channels);

    let mut reader = FormatReader::open(ReaderArgs::new(&path, ".raw", vec![Epoch::new(5, Some(15))])).unwrap();
    let block = reader.read().unwrap();
    assert_eq!(block.names.as_deref().unwrap(), ["E1", "E2"]);
    assert_eq!(block.data.dim(), (1, 2, 10));
    assert_abs_diff_eq!(block.data[[0, 0, 3]], 10e-6, epsilon = 1e-12);
    assert_abs_diff_eq!(block.data[[0, 1, 3]], 8e-6, epsilon = 1e-12);
    assert_eq!(reader.truncation(), (0, 0));
}

#[test]
fn clean_flag_reads_fif_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let path = bdf_fixture(dir.path());
    let args = ReaderArgs::new(&path, ".bdf", vec![Epoch::whole()]).with_clean(true);
    // No LTP001_session_0_clean_raw.fif next to the recording.
    let err = FormatReader::open(args).unwrap().read().unwrap_err();
    assert!(matches!(err, EegError::Format(_)));
}

#[test]
fn cleaned_fif_offsets_count_from_first_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("LTP003_session_2.bdf");
    let channels: Vec<Vec<f32>> = (0..2).map(|c| (0..50).map(|t| (c * 100 + t) as f32).collect()).collect();
    write_fif(&dir.path().join("LTP003_session_2_clean_raw.fif"), 1000, 10.0, &["Fz", "Cz"], &channels);

    // Absolute samples: before the recording, inside it, past its end.
    let epochs = vec![Epoch::new(995, Some(1005)), Epoch::new(1020, Some(1030)), Epoch::new(1045, Some(1055))];
    let mut reader = FormatReader::open(ReaderArgs::new(&path, ".bdf", epochs).with_clean(true)).unwrap();
    let block = reader.read().unwrap();

    assert_eq!(reader.truncation(), (1, 1));
    assert_eq!(block.data.dim(), (1, 2, 10));
    assert_eq!(block.data[[0, 0, 0]], 20.0);
    assert_eq!(block.data[[0, 1, 9]], 129.0);
    assert_eq!(reader.attrs().get("scalp_info").unwrap()["first_samp"], 1000);
}

#[test]
fn all_epochs_trimmed_keep_their_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = bdf_fixture(dir.path());
    let epochs = vec![Epoch::new(-8, Some(2)), Epoch::new(-3, Some(7))];
    let mut reader = FormatReader::open(ReaderArgs::new(&path, ".bdf", epochs)).unwrap();
    let block = reader.read().unwrap();
    assert_eq!(block.data.dim(), (0, 3, 10));
    assert_eq!(reader.truncation(), (2, 0));
}

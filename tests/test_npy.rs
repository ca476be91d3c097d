use eegio::formats::npy::{read_npy, write_npy};
use eegio::formats::{FormatReader, ReaderArgs};
use eegio::{ChannelScheme, Epoch, FormatKind};
use ndarray::Array2;

fn npy_bytes(descr: &str, fortran: bool, shape: (usize, usize), body: &[u8]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '{descr}', 'fortran_order': {}, 'shape': ({}, {}), }}",
        if fortran { "True" } else { "False" },
        shape.0,
        shape.1
    );
    while (10 + dict.len() + 1) % 64 != 0 {
        dict.push(' ');
    }
    dict.push('\n');
    let mut out = b"\x93NUMPY\x01\x00".to_vec();
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend_from_slice(body);
    out
}

#[test]
fn int16_c_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeg.npy");
    let body: Vec<u8> = [1i16, 2, 3, -4, -5, -6].iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(&path, npy_bytes("<i2", false, (2, 3), &body)).unwrap();

    let a = read_npy(&path).unwrap();
    assert_eq!(a, Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, -4.0, -5.0, -6.0]).unwrap());
}

#[test]
fn float32_fortran_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeg.npy");
    // Column-major [[1, 2, 3], [4, 5, 6]].
    let body: Vec<u8> = [1f32, 4., 2., 5., 3., 6.].iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(&path, npy_bytes("<f4", true, (2, 3), &body)).unwrap();

    let a = read_npy(&path).unwrap();
    assert_eq!(a[[0, 2]], 3.0);
    assert_eq!(a[[1, 0]], 4.0);
}

#[test]
fn reader_uses_sequential_contacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeg.npy");
    write_npy(&path, &Array2::from_shape_fn((4, 100), |(c, t)| (c * 100 + t) as f64)).unwrap();

    let scheme = ChannelScheme::pairs([(2, 4, "b-d")]);
    let args = ReaderArgs::new(&path, "float64", vec![Epoch::new(10, Some(20)), Epoch::new(40, Some(50))])
        .with_scheme(Some(scheme));
    let mut reader = FormatReader::open(args).unwrap();
    assert_eq!(reader.kind(), FormatKind::Npy);
    let block = reader.read().unwrap();
    assert_eq!(block.contacts, vec![1, 2, 3, 4]);
    assert_eq!(block.data.dim(), (2, 4, 10));

    let out = reader.rereference(&block).unwrap();
    assert!(out.data.iter().all(|&v| v == -200.0));
}

#[test]
fn open_stop_reads_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeg.npy");
    write_npy(&path, &Array2::zeros((2, 33))).unwrap();
    let block = FormatReader::open(ReaderArgs::new(&path, "float64", vec![Epoch::new(3, None)]))
        .unwrap()
        .read()
        .unwrap();
    assert_eq!(block.data.dim(), (1, 2, 30));
}

#[test]
fn bad_magic_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeg.npy");
    std::fs::write(&path, b"not numpy").unwrap();
    assert!(read_npy(&path).is_err());
}

//! Error taxonomy.
//!
//! Input validation, format mismatches and rereferencing feasibility are
//! distinct variants so callers can match on them.  Low-level parsers use
//! `anyhow` internally; their failures surface as [`EegError::Format`].
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EegError {
    #[error("rel_start ({rel_start} ms) must precede rel_stop ({rel_stop} ms)")]
    InvalidWindow { rel_start: f64, rel_stop: f64 },

    #[error("scheme format error: {0}")]
    SchemeFormat(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("incompatible parameters: {0}")]
    IncompatibleParameters(String),

    #[error("rereferencing not possible: {0}")]
    RereferencingNotPossible(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("split EEG filenames don't seem to match what are in the events: {}", path.display())]
    NamingMismatch { path: PathBuf },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("epoch [{start}, {stop:?}) lies outside a recording of {n_samples} samples")]
    EpochOutOfRange { start: i64, stop: Option<i64>, n_samples: usize },

    #[error("epochs have different lengths: {0:?}")]
    RaggedEpochs(Vec<usize>),

    #[error("unknown protocol for subject {0:?}")]
    UnknownProtocol(String),

    #[error("missing data: {0}")]
    MissingData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("malformed recording: {0:#}")]
    Format(#[from] anyhow::Error),
}

impl EegError {
    /// True for errors that describe an unsatisfiable request rather than a
    /// bug or I/O failure; the caller may retry with another scheme.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EegError::RereferencingNotPossible(_))
    }
}

pub type Result<T> = std::result::Result<T, EegError>;

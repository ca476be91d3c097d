//! # eegio — epoch extraction and rereferencing for EEG recordings
//!
//! `eegio` loads event-locked epochs (or whole sessions) of intracranial and
//! scalp EEG from the on-disk layouts used by clinical recording pipelines,
//! optionally rereferences them through a bipolar or monopolar channel
//! scheme, and returns one labelled `[epochs, channels, time]` array.
//!
//! ## Pipeline overview
//!
//! ```text
//! events (eegfile, eegoffset)
//!   │
//!   ├─ assembler         validate, make eegfile absolute, group by file
//!   ├─ sources           sample rate + on-disk dtype per recording
//!   ├─ epoch             offsets + [rel_start, rel_stop) ms → sample ranges
//!   ├─ formats           split files · .h5 container · .npy · scalp bdf/raw/fif
//!   ├─ reference         pair subtraction or contact selection
//!   └─ timeseries        per-file results concatenated along events
//!        │
//!        └─→ TimeSeries { data [E, C, T], channels, epochs, events, attrs }
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::rc::Rc;
//! use eegio::{ChannelScheme, CmlReader, EventRow, LoaderConfig, PathQuery};
//!
//! let resolver = |data_type: &str, q: &PathQuery| -> eegio::Result<Option<PathBuf>> {
//!     Ok((data_type == "sources").then(|| PathBuf::from(format!("/data/{}/sources.json", q.subject))))
//! };
//! let mut reader = CmlReader::new("R1111M", LoaderConfig::from_env(), Rc::new(resolver))
//!     .unwrap()
//!     .with_experiment("FR1")
//!     .with_session(0);
//!
//! let events: Vec<EventRow> = eegio::read_events_json("events.json".as_ref()).unwrap();
//! let scheme = ChannelScheme::pairs([(1, 2, "LA1-LA2"), (2, 3, "LA2-LA3")]);
//! let eeg = reader
//!     .load_eeg(Some(events), Some(-100.0), Some(900.0), Some(scheme), false)
//!     .unwrap();
//! println!("{:?} {:?}", eeg.shape(), eeg.channels);
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use eegio::formats::{FormatReader, ReaderArgs};
//! use eegio::{epochs_from_offsets, rereference, ChannelScheme, Window};
//!
//! let window = Window::from_bounds(0.0, 500.0).unwrap();
//! let epochs = epochs_from_offsets(&[1000, 5000], &window, 1000.0);
//! let mut reader = FormatReader::open(ReaderArgs::new("/data/eeg.npy", "float64", epochs)).unwrap();
//! let block = reader.read().unwrap();
//! let scheme = ChannelScheme::pairs([(1, 2, "A-B")]);
//! let out = rereference(&block.data, &block.contacts, &scheme).unwrap();
//! assert_eq!(out.labels, vec!["A-B"]);
//! ```

pub mod assembler;
pub mod cache;
pub mod config;
pub mod epoch;
pub mod error;
pub mod events;
pub mod formats;
pub mod io;
pub mod reader;
pub mod reference;
pub mod scheme;
pub mod sources;
pub mod timeseries;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// assembler + router
pub use assembler::{EegReader, EegRequest, PathQuery, PathResolver};
pub use cache::ReaderCache;
pub use reader::{CmlReader, ReaderKey};

// config + errors
pub use config::LoaderConfig;
pub use error::{EegError, Result};

// epoching
pub use epoch::{epochs_from_offsets, ms_to_samples, onsets_to_offsets, samples_to_ms, to_epochs, Epoch, Window};
pub use events::{read_events_json, EventRow, Protocol};

// formats
pub use formats::{FormatKind, FormatReader, RawChannelBlock, ReaderArgs};

// io — safetensors export
pub use io::{write_timeseries, StWriter};

// rereferencing
pub use reference::{rereference, Rereferenced};
pub use scheme::{includes_contact, ChannelScheme, SchemeKind};

// metadata + results
pub use sources::{SampleDtype, SourcesInfo};
pub use timeseries::{Attrs, ConcatDim, TimeSeries};

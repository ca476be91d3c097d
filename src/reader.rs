//! Top-level router for one subject.
//!
//! [`CmlReader`] checks that a request belongs to the subject (and session)
//! it was built for, then hands it to a cached [`EegReader`].
use std::path::PathBuf;
use std::rc::Rc;

use crate::assembler::{EegReader, EegRequest, PathResolver};
use crate::cache::ReaderCache;
use crate::config::LoaderConfig;
use crate::error::{EegError, Result};
use crate::events::{EventRow, Protocol};
use crate::scheme::ChannelScheme;
use crate::timeseries::TimeSeries;

/// Everything a reader is constructed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReaderKey {
    pub data_type: String,
    pub subject: String,
    pub experiment: Option<String>,
    pub session: Option<i64>,
    pub localization: i64,
    pub montage: i64,
    pub rootdir: PathBuf,
}

pub struct CmlReader {
    pub subject: String,
    pub experiment: Option<String>,
    pub session: Option<i64>,
    pub localization: i64,
    pub montage: i64,
    pub protocol: Protocol,
    config: LoaderConfig,
    resolver: Rc<dyn PathResolver>,
    cache: ReaderCache<ReaderKey, EegReader>,
}

impl std::fmt::Debug for CmlReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmlReader")
            .field("subject", &self.subject)
            .field("experiment", &self.experiment)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl CmlReader {
    /// # Errors
    ///
    /// [`EegError::UnknownProtocol`] when the subject code matches no
    /// protocol.
    pub fn new(subject: impl Into<String>, config: LoaderConfig, resolver: Rc<dyn PathResolver>) -> Result<Self> {
        let subject = subject.into();
        let protocol = Protocol::for_subject(&subject)?;
        Ok(Self {
            subject,
            experiment: None,
            session: None,
            localization: 0,
            montage: 0,
            protocol,
            config,
            resolver,
            cache: ReaderCache::new(),
        })
    }

    pub fn with_experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = Some(experiment.into());
        self
    }

    pub fn with_session(mut self, session: i64) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_montage(mut self, localization: i64, montage: i64) -> Self {
        self.localization = localization;
        self.montage = montage;
        self
    }

    pub fn cache_mut(&mut self) -> &mut ReaderCache<ReaderKey, EegReader> {
        &mut self.cache
    }

    fn key(&self, data_type: &str) -> ReaderKey {
        ReaderKey {
            data_type: data_type.to_string(),
            subject: self.subject.clone(),
            experiment: self.experiment.clone(),
            session: self.session,
            localization: self.localization,
            montage: self.montage,
            rootdir: self.config.rootdir.clone(),
        }
    }

    fn eeg_reader(&mut self) -> Result<Rc<EegReader>> {
        let key = self.key("eeg");
        let (subject, experiment, session) = (self.subject.clone(), self.experiment.clone(), self.session);
        let config = self.config.clone();
        let resolver = Rc::clone(&self.resolver);
        self.cache.get_or_create(&key, move || {
            let mut reader = EegReader::new(subject, config, resolver);
            reader.experiment = experiment;
            reader.session = session;
            Ok(reader)
        })
    }

    /// Load EEG.
    ///
    /// With `events`, epochs span `[rel_start, rel_stop)` ms around each
    /// event; without, the whole session is returned.  `scheme` selects or
    /// rereferences channels; `clean` picks the cleaned scalp recording.
    ///
    /// # Errors
    ///
    /// * [`EegError::InvalidInput`] when events belong to another subject or
    ///   session, or span several.
    /// * [`EegError::IncompatibleParameters`] when events come without
    ///   `rel_start` and `rel_stop`.
    /// * [`EegError::RereferencingNotPossible`] when `scheme` cannot be
    ///   derived from the recording.
    pub fn load_eeg(
        &mut self,
        events: Option<Vec<EventRow>>,
        rel_start: Option<f64>,
        rel_stop: Option<f64>,
        scheme: Option<ChannelScheme>,
        clean: bool,
    ) -> Result<TimeSeries> {
        if let Some(events) = &events {
            self.check_events(events)?;
            if rel_start.is_none() || rel_stop.is_none() {
                return Err(EegError::IncompatibleParameters(
                    "rel_start and rel_stop are required when passing events".into(),
                ));
            }
        }
        let request = EegRequest { events, rel_start, rel_stop, scheme, clean };
        self.eeg_reader()?.load(&request)
    }

    fn check_events(&self, events: &[EventRow]) -> Result<()> {
        let Some(first) = events.first() else {
            return Ok(());
        };
        if events.iter().any(|e| e.subject != first.subject) {
            return Err(EegError::InvalidInput("events must correspond to one subject only".into()));
        }
        if first.subject != self.subject {
            return Err(EegError::InvalidInput(format!(
                "events must correspond to the subject with which the reader was initialized: {} (events correspond to {})",
                self.subject, first.subject
            )));
        }
        if events.iter().any(|e| e.session != first.session) {
            return Err(EegError::InvalidInput("events must correspond to one session only".into()));
        }
        if let Some(session) = self.session {
            if first.session != session {
                return Err(EegError::InvalidInput(format!(
                    "events must correspond to the session with which the reader was initialized: {session} (events correspond to {})",
                    first.session
                )));
            }
        }
        Ok(())
    }
}

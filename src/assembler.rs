//! Session assembler: event rows in, one [`TimeSeries`] out.
//!
//! ```text
//! events ──validate──► drop negative offsets ──► absolute eegfile paths
//!        ──group by eegfile──► per file: sources ► epochs ► read ► rereference
//!        ──concatenate on events──► TimeSeries (+ rereferencing_possible)
//! ```
//!
//! Locating `sources.json` and `task_events` is delegated to a
//! [`PathResolver`]; everything else is driven by [`LoaderConfig`].
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::LoaderConfig;
use crate::epoch::{epochs_from_offsets, Window};
use crate::error::{EegError, Result};
use crate::events::{read_events_json, EventRow, Protocol};
use crate::formats::{FormatKind, FormatReader, ReaderArgs};
use crate::scheme::ChannelScheme;
use crate::sources::SourcesInfo;
use crate::timeseries::{ConcatDim, TimeSeries};

/// Parameters of a [`PathResolver`] lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathQuery {
    pub subject: String,
    pub experiment: Option<String>,
    pub session: Option<i64>,
    /// Recording base name, for data types that live next to one file.
    pub basename: Option<String>,
}

/// Finds files of a given data type (`"sources"`, `"task_events"`, …).
///
/// `Ok(None)` means the file does not exist for this query.
pub trait PathResolver {
    fn find(&self, data_type: &str, query: &PathQuery) -> Result<Option<PathBuf>>;
}

impl<F> PathResolver for F
where
    F: Fn(&str, &PathQuery) -> Result<Option<PathBuf>>,
{
    fn find(&self, data_type: &str, query: &PathQuery) -> Result<Option<PathBuf>> {
        self(data_type, query)
    }
}

/// One load request.
#[derive(Debug, Clone, Default)]
pub struct EegRequest {
    /// Events to epoch around.  `None` loads the whole session.
    pub events: Option<Vec<EventRow>>,
    /// ms relative to each event.
    pub rel_start: Option<f64>,
    pub rel_stop: Option<f64>,
    pub scheme: Option<ChannelScheme>,
    /// Cleaned scalp EEG.
    pub clean: bool,
}

impl EegRequest {
    pub fn for_events(events: Vec<EventRow>, rel_start: f64, rel_stop: f64) -> Self {
        Self {
            events: Some(events),
            rel_start: Some(rel_start),
            rel_stop: Some(rel_stop),
            ..Self::default()
        }
    }

    pub fn whole_session() -> Self {
        Self::default()
    }

    pub fn with_scheme(mut self, scheme: ChannelScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// Loads EEG for one subject (and optionally one experiment and session).
pub struct EegReader {
    pub subject: String,
    pub experiment: Option<String>,
    pub session: Option<i64>,
    config: LoaderConfig,
    resolver: Rc<dyn PathResolver>,
}

impl EegReader {
    pub fn new(subject: impl Into<String>, config: LoaderConfig, resolver: Rc<dyn PathResolver>) -> Self {
        Self {
            subject: subject.into(),
            experiment: None,
            session: None,
            config,
            resolver,
        }
    }

    pub fn with_experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = Some(experiment.into());
        self
    }

    pub fn with_session(mut self, session: i64) -> Self {
        self.session = Some(session);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load the request into a single series.
    ///
    /// # Errors
    ///
    /// * [`EegError::IncompatibleParameters`] when events come without both
    ///   `rel_start` and `rel_stop`.
    /// * [`EegError::InvalidInput`] for an empty or multi-subject batch, or a
    ///   whole-session request without a session.
    /// * [`EegError::InvalidWindow`] when `rel_start > rel_stop`.
    /// * Any reader or rereferencing error.
    pub fn load(&self, request: &EegRequest) -> Result<TimeSeries> {
        let (events, window) = match &request.events {
            Some(events) => {
                let (Some(rel_start), Some(rel_stop)) = (request.rel_start, request.rel_stop) else {
                    return Err(EegError::IncompatibleParameters(
                        "rel_start and rel_stop must be given with events".into(),
                    ));
                };
                let window = Window::from_bounds(rel_start, rel_stop)?;
                let mut events = events.clone();
                if self.config.drop_negative_offsets {
                    let before = events.len();
                    events.retain(|e| e.eegoffset >= 0);
                    if events.len() < before {
                        tracing::debug!(dropped = before - events.len(), "dropped events with negative eegoffset");
                    }
                }
                (events, window)
            }
            None => {
                let window = Window::from_bounds(request.rel_start.unwrap_or(0.0), request.rel_stop.unwrap_or(-1.0))?;
                (vec![self.session_event()?], window)
            }
        };

        if events.is_empty() {
            return Err(EegError::InvalidInput("no events found".into()));
        }
        let subject = &events[0].subject;
        if events.iter().any(|e| &e.subject != subject) {
            return Err(EegError::InvalidInput(
                "events must correspond to one subject only".into(),
            ));
        }

        let events = events
            .into_iter()
            .map(|e| self.absolute_eegfile(e))
            .collect::<Result<Vec<_>>>()?;

        let parts = group_by_file(events)
            .into_iter()
            .map(|(eegfile, group)| self.load_file(&eegfile, group, &window, request))
            .collect::<Result<Vec<_>>>()?;
        combine(parts)
    }

    /// First event of the session that points at a recording.
    fn session_event(&self) -> Result<EventRow> {
        let session = self.session.ok_or_else(|| {
            EegError::InvalidInput("a session must be specified to load an entire session of EEG data".into())
        })?;
        let experiment = self
            .experiment
            .as_deref()
            .ok_or_else(|| EegError::InvalidInput("an experiment is required to load a whole session".into()))?;

        // PS4 sessions are logged under the record-only experiment name.
        let experiment = match experiment.strip_suffix('5') {
            Some(stem) if experiment.starts_with("PS4") => stem,
            _ => experiment,
        };

        let query = PathQuery {
            subject: self.subject.clone(),
            experiment: Some(experiment.to_string()),
            session: Some(session),
            basename: None,
        };
        let path = self
            .resolver
            .find("task_events", &query)?
            .ok_or_else(|| EegError::MissingData(format!("no task events for {} {experiment} session {session}", self.subject)))?;

        let mut event = read_events_json(&path)?
            .into_iter()
            .find(|e| !e.eegfile.is_empty())
            .ok_or_else(|| EegError::MissingData(format!("{}: no event references an EEG file", path.display())))?;
        event.eegoffset = 0;
        if event.subject.is_empty() {
            event.subject = self.subject.clone();
        }
        Ok(event)
    }

    /// Relative `eegfile` values name a file in the processed-EEG directory.
    fn absolute_eegfile(&self, mut event: EventRow) -> Result<EventRow> {
        if event.eegfile.is_empty() {
            return Err(EegError::MissingData(format!(
                "event at offset {} has no eegfile",
                event.eegoffset
            )));
        }
        if !event.eegfile.starts_with('/') {
            let protocol = Protocol::for_subject(&event.subject)?;
            let experiment = if event.experiment.is_empty() {
                self.experiment.clone().unwrap_or_default()
            } else {
                event.experiment.clone()
            };
            event.eegfile = self.config.processed_eeg_path(
                protocol.as_str(),
                &event.subject,
                &experiment,
                event.session,
                &event.eegfile,
            );
        }
        Ok(event)
    }

    fn load_file(
        &self,
        eegfile: &str,
        mut events: Vec<EventRow>,
        window: &Window,
        request: &EegRequest,
    ) -> Result<(TimeSeries, bool)> {
        let first = &events[0];
        let protocol = Protocol::for_subject(&first.subject)?;
        let query = PathQuery {
            subject: first.subject.clone(),
            experiment: Some(first.experiment.clone()).filter(|e| !e.is_empty()).or_else(|| self.experiment.clone()),
            session: Some(first.session),
            basename: Path::new(eegfile).file_name().map(|n| n.to_string_lossy().into_owned()),
        };
        let sources_path = self
            .resolver
            .find("sources", &query)?
            .ok_or_else(|| EegError::MissingData(format!("no recording metadata for {eegfile}")))?;
        let sources = SourcesInfo::from_file(&sources_path, protocol)?;

        if window.is_whole_session() {
            events.truncate(1);
        }
        let offsets: Vec<i64> = events.iter().map(|e| e.eegoffset).collect();
        let mut epochs = epochs_from_offsets(&offsets, window, sources.sample_rate);

        let path = self.config.resolve(eegfile);
        let args = ReaderArgs::new(path, sources.data_format.clone(), epochs.clone())
            .with_scheme(request.scheme.clone())
            .with_clean(request.clean);
        let mut reader = FormatReader::open(args)?;
        let block = reader.read()?;

        let (data, channels) = if reader.kind() == FormatKind::Scalp {
            let (pre, post) = reader.truncation();
            if pre + post > 0 {
                let keep = pre..events.len() - post;
                events = events[keep.clone()].to_vec();
                epochs = epochs[keep].to_vec();
            }
            if request.scheme.is_some() {
                tracing::warn!(eegfile, "scheme ignored for scalp EEG");
            }
            let names = block.names.clone().unwrap_or_else(|| channel_names(&block.contacts));
            (block.data, names)
        } else if request.scheme.is_some() {
            let reref = reader.rereference(&block)?;
            if !reref.missing.is_empty() {
                tracing::warn!(eegfile, missing = ?reref.missing, "requested channels not in recording");
            }
            (reref.data, reref.labels)
        } else {
            let names = channel_names(&block.contacts);
            (block.data, names)
        };

        tracing::info!(
            eegfile,
            epochs = data.dim().0,
            channels = data.dim().1,
            samples = data.dim().2,
            "loaded EEG"
        );

        let series = TimeSeries::from_array3(
            data,
            sources.sample_rate,
            Some(epochs),
            Some(channels),
            events,
            window.tstart_ms(),
            Some(reader.attrs()),
        )?;
        Ok((series, reader.rereferencing_possible()))
    }
}

/// Stack per-file results; rereferencing is possible only if it was for
/// every file.
fn combine(parts: Vec<(TimeSeries, bool)>) -> Result<TimeSeries> {
    let rereferencing_possible = parts.iter().all(|(_, possible)| *possible);
    let series = parts.into_iter().map(|(ts, _)| ts).collect();
    let mut out = TimeSeries::concatenate(series, ConcatDim::Events)?;
    out.attrs.insert("rereferencing_possible", rereferencing_possible);
    Ok(out)
}

fn channel_names(contacts: &[i64]) -> Vec<String> {
    contacts.iter().map(|c| format!("CH{c}")).collect()
}

/// Group events by `eegfile`, in order of first appearance.
fn group_by_file(events: Vec<EventRow>) -> Vec<(String, Vec<EventRow>)> {
    let mut groups: Vec<(String, Vec<EventRow>)> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|(f, _)| *f == event.eegfile) {
            Some((_, rows)) => rows.push(event),
            None => groups.push((event.eegfile.clone(), vec![event])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_files(_: &str, _: &PathQuery) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn row(subject: &str, eegfile: &str, offset: i64) -> EventRow {
        EventRow::at_offset(offset).with_source(subject, "FR1", 0, eegfile)
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let groups = group_by_file(vec![row("R1", "/b", 0), row("R1", "/a", 1), row("R1", "/b", 2)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "/b");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1[0].eegoffset, 1);
    }

    fn part(fill: f64) -> TimeSeries {
        let data = ndarray::Array3::from_elem((1, 2, 4), fill);
        TimeSeries::from_array3(data, 500.0, None, None, Vec::new(), 0.0, None).unwrap()
    }

    #[test]
    fn rereferencing_flag_needs_every_file() {
        let out = combine(vec![(part(1.0), true), (part(2.0), false), (part(3.0), true)]).unwrap();
        assert_eq!(out.shape(), (3, 2, 4));
        assert_eq!(out.attrs.get_bool("rereferencing_possible"), Some(false));

        let out = combine(vec![(part(1.0), true), (part(2.0), true)]).unwrap();
        assert_eq!(out.attrs.get_bool("rereferencing_possible"), Some(true));
    }

    #[test]
    fn events_without_window_are_incompatible() {
        let reader = EegReader::new("R1111M", LoaderConfig::default(), Rc::new(no_files));
        let request = EegRequest { events: Some(vec![row("R1111M", "/x", 0)]), ..EegRequest::default() };
        assert!(matches!(reader.load(&request), Err(EegError::IncompatibleParameters(_))));
    }

    #[test]
    fn empty_and_mixed_batches_are_rejected() {
        let reader = EegReader::new("R1111M", LoaderConfig::default(), Rc::new(no_files));
        let empty = EegRequest::for_events(vec![row("R1111M", "/x", -5)], 0.0, 10.0);
        assert!(matches!(reader.load(&empty), Err(EegError::InvalidInput(_))));

        let mixed = EegRequest::for_events(vec![row("R1111M", "/x", 0), row("R1222M", "/x", 0)], 0.0, 10.0);
        assert!(matches!(reader.load(&mixed), Err(EegError::InvalidInput(_))));
    }

    #[test]
    fn whole_session_needs_a_session() {
        let reader = EegReader::new("R1111M", LoaderConfig::default(), Rc::new(no_files)).with_experiment("FR1");
        let err = reader.load(&EegRequest::whole_session()).unwrap_err();
        assert!(matches!(err, EegError::InvalidInput(_)));
    }

    #[test]
    fn relative_eegfile_uses_template() {
        let reader = EegReader::new("R1111M", LoaderConfig::default(), Rc::new(no_files));
        let e = reader.absolute_eegfile(row("R1111M", "R1111M_FR1_0_22Jan16_1638", 0)).unwrap();
        assert!(e.eegfile.starts_with("/protocols/r1/subjects/R1111M/experiments/FR1/sessions/0/"));
        assert!(e.eegfile.ends_with("/noreref/R1111M_FR1_0_22Jan16_1638"));

        let abs = reader.absolute_eegfile(row("R1111M", "/data/eeg.h5", 0)).unwrap();
        assert_eq!(abs.eegfile, "/data/eeg.h5");
    }

    #[test]
    fn ps4_record_only_experiment() {
        let seen = Rc::new(std::cell::RefCell::new(None));
        let spy = {
            let seen = Rc::clone(&seen);
            move |_: &str, q: &PathQuery| -> Result<Option<PathBuf>> {
                *seen.borrow_mut() = q.experiment.clone();
                Ok(None)
            }
        };
        let reader = EegReader::new("R1111M", LoaderConfig::default(), Rc::new(spy))
            .with_experiment("PS4_FR5")
            .with_session(1);
        assert!(matches!(reader.load(&EegRequest::whole_session()), Err(EegError::MissingData(_))));
        assert_eq!(seen.borrow().as_deref(), Some("PS4_FR"));
    }
}

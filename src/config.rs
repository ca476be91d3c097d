//! Loader configuration.
//!
//! [`LoaderConfig`] holds everything the session assembler needs to turn the
//! `eegfile` column of an event log into an absolute path on disk.  All fields
//! have defaults matching the standard data-tree layout.
use std::path::{Path, PathBuf};

/// Environment variable consulted by [`LoaderConfig::from_env`].
pub const ROOT_ENV_VAR: &str = "RHINO_ROOT";

/// Default location of split/processed EEG relative to the data root.
pub const DEFAULT_PROCESSED_EEG: &str = "protocols/{protocol}/subjects/{subject}/experiments/\
{experiment}/sessions/{session}/ephys/current_processed/noreref/{basename}";

/// Configuration for locating and loading EEG.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use eegio::LoaderConfig;
///
/// let cfg = LoaderConfig {
///     rootdir: "/data".into(),
///     ..LoaderConfig::default()
/// };
/// assert_eq!(cfg.rootdir.to_str(), Some("/data"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Root of the data tree.  Absolute `eegfile` paths from events are
    /// re-rooted here (`/a/b` → `<rootdir>/a/b`).
    ///
    /// Default: `/`.
    pub rootdir: PathBuf,

    /// Template for relative `eegfile` entries.
    ///
    /// Placeholders: `{protocol}`, `{subject}`, `{experiment}`, `{session}`,
    /// `{basename}`.
    ///
    /// Default: [`DEFAULT_PROCESSED_EEG`].
    pub processed_eeg: String,

    /// Drop events whose `eegoffset` is negative before epoching.  Such rows
    /// mark events recorded while the amplifier was off.
    ///
    /// Default: `true`.
    pub drop_negative_offsets: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            rootdir: PathBuf::from("/"),
            processed_eeg: DEFAULT_PROCESSED_EEG.to_string(),
            drop_negative_offsets: true,
        }
    }
}

impl LoaderConfig {
    /// Defaults, with `rootdir` taken from `RHINO_ROOT` when it is set.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR) {
            cfg.rootdir = PathBuf::from(root);
        }
        cfg
    }

    /// Fill the processed-EEG template.  The result is relative to the data
    /// root and always starts with `/`.
    pub fn processed_eeg_path(
        &self,
        protocol: &str,
        subject: &str,
        experiment: &str,
        session: i64,
        basename: &str,
    ) -> String {
        let rel = self
            .processed_eeg
            .replace("{protocol}", protocol)
            .replace("{subject}", subject)
            .replace("{experiment}", experiment)
            .replace("{session}", &session.to_string())
            .replace("{basename}", basename);
        format!("/{}", rel.trim_start_matches('/'))
    }

    /// Re-root a protocol-absolute path under [`rootdir`](Self::rootdir).
    pub fn resolve(&self, eegfile: &str) -> PathBuf {
        let p = Path::new(eegfile.trim_start_matches('/'));
        self.rootdir.join(p)
    }
}

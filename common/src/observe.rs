//! The observation stream: one record per notable event of a reconciliation.
//!
//! The engine reports what it does (or, in a dry run, would do) through an [`Observer`] it is
//! handed, so callers decide where the stream goes.

use std::path::PathBuf;

/// A notable event, tagged with the path(s) involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    DirectoryCreated { dst: PathBuf },
    Ignored { src: PathBuf },
    Copied { src: PathBuf, dst: PathBuf },
    AlreadyOk { src: PathBuf, dst: PathBuf },
    /// destination is up to date but its backup holds content that was never reviewed
    NeedsCheck { backup: PathBuf },
    MovedToBackup { dst: PathBuf, backup: PathBuf },
}

impl Observation {
    pub fn category(&self) -> &'static str {
        match self {
            Observation::DirectoryCreated { .. } => "MKDIR",
            Observation::Ignored { .. } => "IGNORE",
            Observation::Copied { .. } => "COPY",
            Observation::AlreadyOk { .. } => "OK",
            Observation::NeedsCheck { .. } => "CHECK",
            Observation::MovedToBackup { .. } => "MOVE",
        }
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:\t", self.category())?;
        match self {
            Observation::DirectoryCreated { dst } => write!(f, "{}", dst.display()),
            Observation::Ignored { src } => write!(f, "{}", src.display()),
            Observation::Copied { src, dst } | Observation::AlreadyOk { src, dst } => {
                write!(f, "{} <- {}", dst.display(), src.display())
            }
            Observation::NeedsCheck { backup } => write!(f, "{}", backup.display()),
            Observation::MovedToBackup { dst, backup } => {
                write!(f, "{} <- {}", backup.display(), dst.display())
            }
        }
    }
}

pub trait Observer: Send + Sync {
    fn observe(&self, observation: Observation);
}

/// Emits every observation as an INFO event, one line each.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn observe(&self, observation: Observation) {
        tracing::info!("{}", observation);
    }
}

/// Keeps observations in memory, in the order they were made.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    observations: std::sync::Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything recorded so far and clears the record.
    pub fn take(&self) -> Vec<Observation> {
        std::mem::take(&mut *self.observations.lock().unwrap())
    }
}

impl Observer for RecordingObserver {
    fn observe(&self, observation: Observation) {
        self.observations.lock().unwrap().push(observation);
    }
}

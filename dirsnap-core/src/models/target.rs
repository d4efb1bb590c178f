//! Backup destinations and their run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_BACKUPS: usize = 7;

/// Where archives for a target go.
///
/// A directory receives timestamped archives and is rotated by count; a file
/// is overwritten in place on every run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Directory(PathBuf),
    File(PathBuf),
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Destination::Directory(p) | Destination::File(p) => p,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Destination::File(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Directory(_) => "directory",
            Destination::File(_) => "file",
        }
    }

    /// Relative destinations are resolved against the job directory.
    pub fn resolve(&self, base: &Path) -> PathBuf {
        base.join(self.path())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// One completed archive copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub filename: String,
    pub source: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    Failure,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => f.write_str("Success"),
            RunOutcome::Failure => f.write_str("Failure"),
        }
    }
}

/// Outcome of the most recent run against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub timestamp: DateTime<Utc>,
    pub status: RunOutcome,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub destination: Destination,
    /// Always positive; zero and negative values are normalized on load
    pub max_backups: usize,
    /// Newest first
    pub backups: Vec<BackupRecord>,
    pub last_run: Option<RunStatus>,
}

impl BackupTarget {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            max_backups: DEFAULT_MAX_BACKUPS,
            backups: Vec::new(),
            last_run: None,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(Destination::Directory(path.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Destination::File(path.into()))
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    /// How many history records this target keeps.
    pub fn history_limit(&self) -> usize {
        match self.destination {
            Destination::File(_) => 1,
            Destination::Directory(_) => self.max_backups.max(1),
        }
    }

    pub fn latest(&self) -> Option<&BackupRecord> {
        self.backups.first()
    }

    pub(crate) fn push_record(&mut self, record: BackupRecord) {
        if self.destination.is_file() {
            self.backups = vec![record];
            return;
        }

        self.backups.insert(0, record);
        self.backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.backups.truncate(self.history_limit());
    }
}

//! Error types for snapshot, rotation and configuration operations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Source, destination or configuration path is missing.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Malformed configuration {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// A member outgrew what its tar header declared while being streamed.
    #[error(
        "File {} is too large for the tar format (declared {declared} bytes); \
         exclude it or split it before archiving",
        path.display()
    )]
    ArchiveTooLarge { path: PathBuf, declared: u64 },

    #[error("Encryption error: {0}")]
    Encryption(String),

    /// One or more stale files could not be removed during rotation.
    #[error("Rotation left {failed} stale file(s) behind in {}", dir.display())]
    PartialRotation { dir: PathBuf, failed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl BackupError {
    /// Wraps an I/O error, promoting `NotFound` to the path-carrying variant.
    pub fn from_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BackupError::NotFound(path.into())
        } else {
            BackupError::Io(err)
        }
    }

    /// Errors that must stop a run before any destination is touched.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BackupError::Parse { .. } | BackupError::Validation(_) | BackupError::Settings(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

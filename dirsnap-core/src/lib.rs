//! dirsnap core library
//!
//! Point-in-time tar.gz snapshots of a directory, copied to one or more
//! destinations with count-based retention and a YAML job configuration that
//! keeps a bounded history of past runs.

pub mod archive;
pub mod config;
pub mod encrypt;
pub mod executor;
pub mod fs;
pub mod models;
pub mod retention;
pub mod store;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::{Settings, SettingsLoader};
pub use executor::{BackupExecutor, RunReport, RunRequest};
pub use models::{BackupConfiguration, BackupRecord, BackupTarget, Destination, RunOutcome};
pub use utils::errors::{BackupError, Result};

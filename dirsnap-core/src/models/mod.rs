//! Job configuration data model.

pub mod configuration;
pub mod target;

pub use configuration::{BackupConfiguration, EncryptionSettings};
pub use target::{BackupRecord, BackupTarget, Destination, RunOutcome, RunStatus, DEFAULT_MAX_BACKUPS};

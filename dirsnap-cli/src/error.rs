//! CLI failures and their process exit codes.

use dirsnap_core::BackupError;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIGURATION: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;
pub const EXIT_DESTINATION: u8 = 4;
pub const EXIT_ENCRYPTION: u8 = 5;
pub const EXIT_TOO_LARGE: u8 = 6;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("{failed} of {total} destination(s) failed")]
    DestinationsFailed { failed: usize, total: usize },

    #[error("{failed} of {total} job(s) failed")]
    JobsFailed { failed: usize, total: usize },

    /// The user (or a non-interactive stdin) declined to continue.
    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    Usage(String),
}

/// Exit code for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return match cli {
            CliError::DestinationsFailed { .. } | CliError::JobsFailed { .. } => EXIT_DESTINATION,
            CliError::Aborted(_) => EXIT_FAILURE,
            CliError::Usage(_) => EXIT_CONFIGURATION,
        };
    }

    match err.downcast_ref::<BackupError>() {
        Some(e) if e.is_configuration_error() => EXIT_CONFIGURATION,
        Some(BackupError::NotFound(_)) => EXIT_NOT_FOUND,
        Some(BackupError::Encryption(_)) => EXIT_ENCRYPTION,
        Some(BackupError::ArchiveTooLarge { .. }) => EXIT_TOO_LARGE,
        Some(BackupError::PartialRotation { .. }) => EXIT_DESTINATION,
        _ => EXIT_FAILURE,
    }
}

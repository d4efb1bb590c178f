//! Utility modules shared by the snapshot engine.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};

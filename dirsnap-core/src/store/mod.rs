//! Loading and saving job configurations and the global registry.

pub mod document;
pub mod registry;

pub use document::{ConfigDocument, TargetDocument};
pub use registry::{
    read_registry, update_registry, write_registry, GlobalRegistry, RegistryDefaults,
    RegistryEntry, RegistryUpdate, TargetTemplate,
};

use crate::models::BackupConfiguration;
use crate::{BackupError, Result};
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default job configuration file name.
pub const CONFIG_FILE_NAME: &str = ".backup.yaml";

const CONFIG_HEADER: &str = "# Backup configuration file\n\
# WARNING: Do not manually edit this file unless you know what you're doing\n";

/// Reads and validates a job configuration.
pub fn load(path: &Path) -> Result<BackupConfiguration> {
    let text = fs::read_to_string(path).map_err(|e| BackupError::from_io(e, path))?;
    let configuration = parse(&text, path)?;
    debug!(
        "Loaded {} with {} target(s)",
        path.display(),
        configuration.targets.len()
    );
    Ok(configuration)
}

pub(crate) fn parse(text: &str, path: &Path) -> Result<BackupConfiguration> {
    if text.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
        return Ok(BackupConfiguration::default());
    }

    let document: ConfigDocument = serde_yaml::from_str(text).map_err(|e| BackupError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    BackupConfiguration::try_from(document)
}

/// Renders the header comment plus YAML body.
pub fn render(configuration: &BackupConfiguration, updated_at: DateTime<Utc>) -> Result<String> {
    let body = serde_yaml::to_string(&ConfigDocument::from(configuration))?;
    Ok(format!(
        "{}# Created/updated by dirsnap on: {}\n{}",
        CONFIG_HEADER,
        updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        body
    ))
}

/// Writes `configuration` to `path`, creating parent directories.
pub fn save(path: &Path, configuration: &BackupConfiguration, updated_at: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, render(configuration, updated_at)?)?;
    debug!("Saved {}", path.display());
    Ok(())
}

//! The optional global registry (`~/.backup.yaml`).
//!
//! It remembers every job location that has run, and carries defaults used
//! when a new job is initialised. The file is opt-in: when it does not exist
//! nothing is ever written to it. Keys this module does not know are carried
//! through rewrites untouched.

use crate::models::{BackupTarget, EncryptionSettings};
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const REGISTRY_FILE_NAME: &str = ".backup.yaml";

const REGISTRY_HEADER: &str = "# Global backup registry\n\
# Tracks all backup locations and their last run times\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalRegistry {
    #[serde(default, skip_serializing_if = "RegistryDefaults::is_empty")]
    pub default: RegistryDefaults,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<RegistryEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionSettings>,

    #[serde(default, rename = "target", skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetTemplate>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RegistryDefaults {
    fn is_empty(&self) -> bool {
        self.encryption.is_none() && self.targets.is_empty() && self.extra.is_empty()
    }
}

/// Jobs living below `base` get one directory target per entry of
/// `targets`, mirroring the job's position under `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTemplate {
    pub base: PathBuf,
    #[serde(default)]
    pub targets: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Absolute path of the directory holding the job configuration
    pub location: PathBuf,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryUpdate {
    /// No registry file; nothing written
    Skipped,
    Added,
    Updated,
}

impl GlobalRegistry {
    /// Directory targets derived from the templates whose base contains the
    /// parent of `job_dir`.
    pub fn template_targets(&self, job_dir: &Path) -> Vec<BackupTarget> {
        let Some(parent) = job_dir.parent() else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        for template in &self.default.targets {
            let Ok(relative) = parent.strip_prefix(&template.base) else {
                continue;
            };
            for base in &template.targets {
                let path = if relative.as_os_str().is_empty() {
                    base.clone()
                } else {
                    base.join(relative)
                };
                targets.push(BackupTarget::directory(path));
            }
        }
        targets
    }

    pub fn upsert(&mut self, location: PathBuf, run_at: DateTime<Utc>) -> RegistryUpdate {
        match self.backups.iter_mut().find(|e| e.location == location) {
            Some(entry) => {
                entry.run_at = run_at;
                RegistryUpdate::Updated
            }
            None => {
                self.backups.push(RegistryEntry { location, run_at });
                RegistryUpdate::Added
            }
        }
    }
}

/// Reads the registry, `None` when the file does not exist.
pub fn read_registry(path: &Path) -> Result<Option<GlobalRegistry>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if text.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
        return Ok(Some(GlobalRegistry::default()));
    }

    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| BackupError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

pub fn write_registry(path: &Path, registry: &GlobalRegistry) -> Result<()> {
    let body = serde_yaml::to_string(registry)?;
    fs::write(path, format!("{}{}", REGISTRY_HEADER, body))?;
    Ok(())
}

/// Records that the job in `location` ran at `now`.
///
/// A missing registry is not an error and is not created.
pub fn update_registry(registry_path: &Path, location: &Path, now: DateTime<Utc>) -> Result<RegistryUpdate> {
    let Some(mut registry) = read_registry(registry_path)? else {
        debug!("No registry at {}, skipping", registry_path.display());
        return Ok(RegistryUpdate::Skipped);
    };

    let location = std::path::absolute(location)?;
    let update = registry.upsert(location, now);
    write_registry(registry_path, &registry)?;

    debug!("Registry {} {:?}", registry_path.display(), update);
    Ok(update)
}

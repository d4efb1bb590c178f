//! On-disk shape of the job configuration (`.backup.yaml`).
//!
//! The document keeps the flat `path`/`file` layout of the YAML file; the
//! conversion into [`BackupConfiguration`] is where a target is checked to
//! name exactly one destination and `maxBackups` is normalized.

use crate::models::{
    BackupConfiguration, BackupRecord, BackupTarget, Destination, EncryptionSettings, RunStatus,
    DEFAULT_MAX_BACKUPS,
};
use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default, rename = "target")]
    pub targets: Vec<TargetDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionSettings>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backups: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<BackupRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunStatus>,
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

impl TargetDocument {
    fn into_target(self, index: usize) -> Result<BackupTarget> {
        let destination = match (non_empty(self.path), non_empty(self.file)) {
            (Some(dir), None) => Destination::Directory(dir),
            (None, Some(file)) => Destination::File(file),
            (Some(_), Some(_)) => {
                return Err(BackupError::Validation(format!(
                    "target #{} sets both 'path' and 'file'",
                    index + 1
                )))
            }
            (None, None) => {
                return Err(BackupError::Validation(format!(
                    "target #{} needs either 'path' or 'file'",
                    index + 1
                )))
            }
        };

        let max_backups = match self.max_backups {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(DEFAULT_MAX_BACKUPS),
            _ => DEFAULT_MAX_BACKUPS,
        };

        let mut target = BackupTarget {
            destination,
            max_backups,
            backups: self.backups,
            last_run: self.last_run,
        };
        target.backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        target.backups.truncate(target.history_limit());

        Ok(target)
    }
}

impl From<&BackupTarget> for TargetDocument {
    fn from(target: &BackupTarget) -> Self {
        let (path, file) = match &target.destination {
            Destination::Directory(p) => (Some(p.clone()), None),
            Destination::File(p) => (None, Some(p.clone())),
        };

        Self {
            path,
            file,
            max_backups: Some(target.max_backups as i64),
            backups: target.backups.clone(),
            last_run: target.last_run.clone(),
        }
    }
}

impl TryFrom<ConfigDocument> for BackupConfiguration {
    type Error = BackupError;

    fn try_from(document: ConfigDocument) -> Result<Self> {
        let targets = document
            .targets
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.into_target(i))
            .collect::<Result<Vec<_>>>()?;

        let configuration = BackupConfiguration {
            excludes: document.excludes,
            targets,
            encryption: document.encryption,
        };
        configuration.validate()?;
        Ok(configuration)
    }
}

impl From<&BackupConfiguration> for ConfigDocument {
    fn from(configuration: &BackupConfiguration) -> Self {
        Self {
            excludes: configuration.excludes.clone(),
            targets: configuration.targets.iter().map(TargetDocument::from).collect(),
            encryption: configuration.encryption.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<BackupConfiguration> {
        let document: ConfigDocument = serde_yaml::from_str(yaml)?;
        BackupConfiguration::try_from(document)
    }

    #[test]
    fn test_max_backups_normalized() {
        let cfg = parse(
            "target:\n  - path: /a\n  - path: /b\n    maxBackups: 0\n  - path: /c\n    maxBackups: -4\n  - path: /d\n    maxBackups: 3\n",
        )
        .unwrap();
        let limits: Vec<_> = cfg.targets.iter().map(|t| t.max_backups).collect();
        assert_eq!(limits, vec![7, 7, 7, 3]);
    }

    #[test]
    fn test_destination_kinds() {
        let cfg = parse("target:\n  - path: /dir\n  - file: /x/latest.tar.gz\n").unwrap();
        assert_eq!(cfg.targets[0].destination, Destination::Directory("/dir".into()));
        assert_eq!(cfg.targets[1].destination, Destination::File("/x/latest.tar.gz".into()));
    }

    #[test]
    fn test_both_or_neither_destination_rejected() {
        assert!(matches!(
            parse("target:\n  - path: /a\n    file: /b\n"),
            Err(BackupError::Validation(_))
        ));
        assert!(matches!(
            parse("target:\n  - maxBackups: 3\n"),
            Err(BackupError::Validation(_))
        ));
        assert!(matches!(
            parse("target:\n  - path: ''\n"),
            Err(BackupError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        assert!(matches!(
            parse("target:\n  - path: /a\n  - path: /a\n"),
            Err(BackupError::Validation(_))
        ));
    }

    #[test]
    fn test_wire_keys() {
        let cfg = parse("excludes: [node_modules]\ntarget:\n  - file: /x.tar.gz\n").unwrap();
        let yaml = serde_yaml::to_string(&ConfigDocument::from(&cfg)).unwrap();
        assert!(yaml.contains("target:"));
        assert!(yaml.contains("file: /x.tar.gz"));
        assert!(yaml.contains("maxBackups: 7"));
        assert!(!yaml.contains("path:"));
        assert!(!yaml.contains("encryption"));
    }
}

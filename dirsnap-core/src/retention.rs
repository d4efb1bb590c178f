//! Count-based rotation of archives in a destination directory, and the
//! archive catalog used by `list` and `status`.
//!
//! Only regular files named `<prefix>*.tar.gz` or `<prefix>*.tar.gz.gpg` are
//! ever considered, so anything else living in a destination is left alone.

use crate::archive::naming::{is_archive_name, is_encrypted_name, parse_archive_name, sidecar_name};
use crate::{BackupError, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A file rotation tried and failed to delete.
#[derive(Debug, Clone, Serialize)]
pub struct RotationFailure {
    pub path: PathBuf,
    pub error: String,
}

/// What a rotation pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationOutcome {
    pub kept: usize,
    pub deleted: Vec<PathBuf>,
    pub sidecars_deleted: Vec<PathBuf>,
    pub failures: Vec<RotationFailure>,
}

impl RotationOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Report value for a pass that left files behind. Never used to fail a run.
    pub fn partial_failure(&self, dir: &Path) -> Option<BackupError> {
        (!self.failures.is_empty()).then(|| BackupError::PartialRotation {
            dir: dir.to_path_buf(),
            failed: self.failures.len(),
        })
    }
}

struct Candidate {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

fn candidates(dir: &Path, prefix: &str) -> Result<Vec<Candidate>> {
    let entries = fs::read_dir(dir).map_err(|e| BackupError::from_io(e, dir))?;
    let mut found = Vec::new();

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || !is_archive_name(&name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };

        found.push(Candidate {
            path: entry.path(),
            name,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    Ok(found)
}

/// Deletes the oldest archives matching `prefix` in `dir` until at most
/// `max_backups` remain, removing each one's sidecar along with it.
///
/// Only failing to list `dir` is an error; individual deletion failures are
/// collected in the outcome and the pass carries on. Running it again on an
/// already rotated directory changes nothing.
pub fn rotate(dir: &Path, prefix: &str, max_backups: usize) -> Result<RotationOutcome> {
    let mut archives = candidates(dir, prefix)?;
    let mut outcome = RotationOutcome {
        kept: archives.len(),
        ..RotationOutcome::default()
    };

    if archives.len() <= max_backups {
        debug!(
            "Rotation not needed in {} ({} of {})",
            dir.display(),
            archives.len(),
            max_backups
        );
        return Ok(outcome);
    }

    archives.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    let excess = archives.len() - max_backups;

    for archive in archives.iter().take(excess) {
        match fs::remove_file(&archive.path) {
            Ok(()) => {
                info!("Removed old backup {}", archive.name);
                outcome.deleted.push(archive.path.clone());
            }
            Err(e) => {
                warn!("Failed to remove old backup {}: {}", archive.path.display(), e);
                outcome.failures.push(RotationFailure {
                    path: archive.path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        }

        let sidecar = dir.join(sidecar_name(&archive.name));
        match fs::remove_file(&sidecar) {
            Ok(()) => outcome.sidecars_deleted.push(sidecar),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove sidecar {}: {}", sidecar.display(), e);
                outcome.failures.push(RotationFailure {
                    path: sidecar,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome.kept = archives.len() - outcome.deleted.len();
    Ok(outcome)
}

/// One archive found in a backup location.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: String,
    /// Source directory name, when the file name follows the generated format
    pub source: Option<String>,
    /// From the file name, falling back to the modification time
    pub created: NaiveDateTime,
    pub encrypted: bool,
    pub bytes: u64,
    pub has_sidecar: bool,
}

/// Lists archives in `dir`, newest first. `filter_prefix` restricts the
/// listing the same way rotation does.
pub fn catalog(dir: &Path, filter_prefix: Option<&str>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    for candidate in candidates(dir, filter_prefix.unwrap_or(""))? {
        let parsed = parse_archive_name(&candidate.name);
        let created = match &parsed {
            Some(p) => p.timestamp,
            None => DateTime::<Local>::from(candidate.modified).naive_local(),
        };
        let bytes = fs::metadata(&candidate.path).map(|m| m.len()).unwrap_or(0);
        let has_sidecar = dir.join(sidecar_name(&candidate.name)).is_file();

        entries.push(ArchiveEntry {
            encrypted: is_encrypted_name(&candidate.name),
            source: parsed.map(|p| p.source),
            path: candidate.path,
            name: candidate.name,
            created,
            bytes,
            has_sidecar,
        });
    }

    entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, age_days: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_days * 86_400);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn five_archives(dir: &Path) {
        for day in 1..=5u64 {
            let stamp = format!("job-2024010{}-000000", day);
            touch(dir, &format!("{}.tar.gz", stamp), 10 - day);
            touch(dir, &format!("{}.backup.yaml", stamp), 10 - day);
        }
    }

    #[test]
    fn test_rotation_removes_oldest_with_sidecars() {
        let dir = TempDir::new().unwrap();
        five_archives(dir.path());

        let outcome = rotate(dir.path(), "job-", 3).unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.deleted.len(), 2);
        assert_eq!(outcome.sidecars_deleted.len(), 2);
        assert_eq!(outcome.kept, 3);
        assert_eq!(
            names(dir.path()),
            vec![
                "job-20240103-000000.backup.yaml",
                "job-20240103-000000.tar.gz",
                "job-20240104-000000.backup.yaml",
                "job-20240104-000000.tar.gz",
                "job-20240105-000000.backup.yaml",
                "job-20240105-000000.tar.gz",
            ]
        );
    }

    #[test]
    fn test_rotation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        five_archives(dir.path());

        rotate(dir.path(), "job-", 3).unwrap();
        let before = names(dir.path());
        let second = rotate(dir.path(), "job-", 3).unwrap();

        assert!(second.deleted.is_empty());
        assert_eq!(names(dir.path()), before);
    }

    #[test]
    fn test_rotation_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        five_archives(dir.path());
        touch(dir.path(), "other-20230101-000000.tar.gz", 400);
        touch(dir.path(), "job-notes.txt", 400);
        touch(dir.path(), "job-20220101-000000.zip", 400);
        fs::create_dir(dir.path().join("job-20210101-000000.tar.gz")).unwrap();

        rotate(dir.path(), "job-", 1).unwrap();

        let left = names(dir.path());
        assert!(left.contains(&"other-20230101-000000.tar.gz".to_string()));
        assert!(left.contains(&"job-notes.txt".to_string()));
        assert!(left.contains(&"job-20220101-000000.zip".to_string()));
        assert!(left.contains(&"job-20210101-000000.tar.gz".to_string()));
        assert!(left.contains(&"job-20240105-000000.tar.gz".to_string()));
        assert!(!left.contains(&"job-20240104-000000.tar.gz".to_string()));
    }

    #[test]
    fn test_encrypted_archives_rotate_with_plain_sidecar_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "job-20240101-000000.tar.gz.gpg", 3);
        touch(dir.path(), "job-20240101-000000.backup.yaml", 3);
        touch(dir.path(), "job-20240102-000000.tar.gz.gpg", 2);

        let outcome = rotate(dir.path(), "job-", 1).unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.sidecars_deleted.len(), 1);
        assert_eq!(names(dir.path()), vec!["job-20240102-000000.tar.gz.gpg"]);
    }

    #[test]
    fn test_missing_sidecar_is_tolerated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "job-20240101-000000.tar.gz", 2);
        touch(dir.path(), "job-20240102-000000.tar.gz", 1);

        let outcome = rotate(dir.path(), "job-", 1).unwrap();

        assert!(outcome.is_clean());
        assert!(outcome.partial_failure(dir.path()).is_none());
        assert!(outcome.sidecars_deleted.is_empty());
    }

    #[test]
    fn test_equal_mtimes_break_ties_by_name() {
        let dir = TempDir::new().unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(3600);
        for name in ["job-b.tar.gz", "job-a.tar.gz", "job-c.tar.gz"] {
            let path = dir.path().join(name);
            fs::write(&path, name).unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }

        rotate(dir.path(), "job-", 1).unwrap();
        assert_eq!(names(dir.path()), vec!["job-c.tar.gz"]);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = TempDir::new().unwrap();
        let err = rotate(&dir.path().join("gone"), "job-", 3).unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[test]
    fn test_partial_failure_report() {
        let outcome = RotationOutcome {
            failures: vec![RotationFailure {
                path: PathBuf::from("/d/job-1.tar.gz"),
                error: "denied".into(),
            }],
            ..RotationOutcome::default()
        };
        let err = outcome.partial_failure(Path::new("/d")).unwrap();
        assert!(matches!(err, BackupError::PartialRotation { failed: 1, .. }));
    }

    #[test]
    fn test_catalog_newest_first() {
        let dir = TempDir::new().unwrap();
        five_archives(dir.path());
        touch(dir.path(), "other-20240110-120000.tar.gz.gpg", 0);

        let all = catalog(dir.path(), None).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].name, "other-20240110-120000.tar.gz.gpg");
        assert!(all[0].encrypted);
        assert!(!all[0].has_sidecar);
        assert_eq!(all[1].source.as_deref(), Some("job"));
        assert!(all[1].has_sidecar);

        let jobs = catalog(dir.path(), Some("job-")).unwrap();
        assert_eq!(jobs.len(), 5);
        assert_eq!(jobs[0].name, "job-20240105-000000.tar.gz");
    }

    #[test]
    fn test_catalog_falls_back_to_mtime() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "manual.tar.gz", 1);

        let entries = catalog(dir.path(), None).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].source.is_none());
        assert!(entries[0].created < Local::now().naive_local());
    }
}

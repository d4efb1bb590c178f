//! File metadata captured during walks.
//!
//! Carries what a tar header needs (size, mode, mtime) and what the size
//! reports display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Kind of a walked entry. Symlinks are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// File metadata for archive headers and reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: u64,

    /// File permissions (Unix mode bits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,

    pub kind: EntryKind,
}

impl FileMetadata {
    /// Extract metadata from a path without following a final symlink
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs::symlink_metadata(path)?))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .unwrap_or_default()
            .as_secs();

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Self {
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            modified,
            permissions,
            kind,
        }
    }

    /// Mode bits for a tar header, with a sensible default off Unix
    pub fn mode(&self) -> u32 {
        match (self.permissions, self.kind) {
            (Some(mode), _) => mode & 0o7777,
            (None, EntryKind::Directory) => 0o755,
            (None, _) => 0o644,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.modified as i64, 0).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_metadata() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = FileMetadata::from_path(temp_file.path())?;

        assert_eq!(metadata.size, 12);
        assert_eq!(metadata.kind, EntryKind::File);
        assert!(metadata.modified > 0);
        assert!(metadata.modified_at().timestamp() > 0);

        Ok(())
    }

    #[test]
    fn test_directory_reports_zero_size() -> std::io::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let metadata = FileMetadata::from_path(dir.path())?;
        assert_eq!(metadata.kind, EntryKind::Directory);
        assert_eq!(metadata.size, 0);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_preservation() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_file = NamedTempFile::new()?;
        fs::set_permissions(temp_file.path(), fs::Permissions::from_mode(0o640))?;

        let metadata = FileMetadata::from_path(temp_file.path())?;

        assert_eq!(metadata.mode(), 0o640);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_not_followed() -> std::io::Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("target.txt"), b"abc")?;
        std::os::unix::fs::symlink("target.txt", dir.path().join("link"))?;

        let metadata = FileMetadata::from_path(&dir.path().join("link"))?;
        assert_eq!(metadata.kind, EntryKind::Symlink);
        assert_eq!(metadata.size, 0);
        Ok(())
    }
}

//! Directory traversal with exclusion pruning.
//!
//! Walks are depth-first in file-name order so archives and reports are
//! deterministic. An excluded directory is never descended into.

use super::exclude::ExclusionMatcher;
use super::metadata::{EntryKind, FileMetadata};
use crate::{BackupError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Exclusion patterns, evaluated against paths relative to the root
    pub exclusions: ExclusionMatcher,

    /// Absolute paths never visited (scratch directory, the archive being written)
    pub skip_paths: Vec<PathBuf>,
}

impl WalkOptions {
    pub fn with_excludes<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            exclusions: ExclusionMatcher::new(patterns),
            ..Self::default()
        }
    }

    /// Adds a path whose subtree must not be visited.
    ///
    /// A skip path that contains `root` is ignored, otherwise the whole walk
    /// would be empty.
    pub fn skip_path(mut self, root: &Path, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !root.starts_with(&path) {
            self.skip_paths.push(path);
        }
        self
    }
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    pub metadata: FileMetadata,

    /// Depth from root (1 for direct children)
    pub depth: usize,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> Result<Self> {
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Self {
            path,
            relative_path,
            metadata: FileMetadata::from_metadata(&metadata),
            depth: entry.depth(),
        })
    }

    pub fn kind(&self) -> EntryKind {
        self.metadata.kind
    }

    pub fn is_file(&self) -> bool {
        self.metadata.kind == EntryKind::File
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }
}

/// Walk a directory tree, calling `callback` for every included entry
/// (files, directories and symlinks). The root itself is not reported.
///
/// The first error from the filesystem or from the callback stops the walk.
pub fn walk_tree<F>(root: &Path, options: &WalkOptions, mut callback: F) -> Result<()>
where
    F: FnMut(&FileInfo) -> Result<()>,
{
    std::fs::metadata(root).map_err(|e| BackupError::from_io(e, root))?;

    let mut walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let entries = walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_skip(entry, root, options));

    for entry in entries {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        callback(&FileInfo::from_entry(&entry, root)?)?;
    }

    Ok(())
}

fn should_skip(entry: &DirEntry, root: &Path, options: &WalkOptions) -> bool {
    let path = entry.path();

    if options.skip_paths.iter().any(|skip| path.starts_with(skip)) {
        debug!("Skipping {} (scratch area)", path.display());
        return true;
    }

    let relative = path.strip_prefix(root).unwrap_or(path);
    if options.exclusions.is_excluded(relative) {
        debug!("Excluding {}", relative.display());
        return true;
    }

    false
}

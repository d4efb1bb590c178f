//! Size analysis of a source tree.
//!
//! Used for the pre-flight warning before archiving and for the standalone
//! large-files report. Both passes are read-only and walk the tree once.

use super::walker::{walk_tree, WalkOptions};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const MB: u64 = 1024 * 1024;
pub const GB: u64 = 1024 * MB;

/// Largest member size a classic tar header can describe (11 octal digits).
pub const STANDARD_TAR_SIZE_LIMIT: u64 = 8 * GB;

/// Members above this size are written with a PAX extended header and are
/// flagged by the pre-flight analysis.
pub const RECOMMENDED_MAX_FILE_SIZE: u64 = STANDARD_TAR_SIZE_LIMIT - 100 * MB;

/// Aggregate view of a tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct SizeSummary {
    pub total_bytes: u64,
    pub file_count: usize,
    pub largest_path: Option<PathBuf>,
    pub largest_bytes: u64,
    /// Relative paths of files strictly larger than the threshold
    pub over_threshold: Vec<PathBuf>,
}

/// One entry of the large-files report
#[derive(Debug, Clone, Serialize)]
pub struct LargeFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Summarize the included files under `root`.
///
/// A threshold of 0 reports every file as over the threshold.
pub fn analyze<S: AsRef<str>>(root: &Path, patterns: &[S], threshold_bytes: u64) -> Result<SizeSummary> {
    let options = WalkOptions::with_excludes(patterns);
    let mut summary = SizeSummary::default();

    walk_tree(root, &options, |info| {
        if !info.is_file() {
            return Ok(());
        }

        let size = info.size();
        summary.total_bytes += size;
        summary.file_count += 1;

        if summary.largest_path.is_none() || size > summary.largest_bytes {
            summary.largest_bytes = size;
            summary.largest_path = Some(info.relative_path.clone());
        }

        if threshold_bytes == 0 || size > threshold_bytes {
            summary.over_threshold.push(info.relative_path.clone());
        }

        Ok(())
    })?;

    Ok(summary)
}

/// List included files larger than `threshold_bytes`, largest first.
///
/// Ties are ordered by relative path.
pub fn list_large<S: AsRef<str>>(root: &Path, patterns: &[S], threshold_bytes: u64) -> Result<Vec<LargeFile>> {
    let options = WalkOptions::with_excludes(patterns);
    let mut large = Vec::new();

    walk_tree(root, &options, |info| {
        if info.is_file() && (threshold_bytes == 0 || info.size() > threshold_bytes) {
            large.push(LargeFile {
                path: info.path.clone(),
                relative_path: info.relative_path.clone(),
                bytes: info.size(),
                modified: info.metadata.modified_at(),
            });
        }
        Ok(())
    })?;

    large.sort_by(|a, b| {
        b.bytes
            .cmp(&a.bytes)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    Ok(large)
}

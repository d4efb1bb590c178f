//! Unpacking of plain (already decrypted) archives.

use crate::{BackupError, Result};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use tar::{Archive, EntryType};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreSummary {
    pub restored: usize,
    /// Members left alone because the destination already had them
    pub skipped: usize,
}

/// Unpacks `archive_path` into `target_dir`, creating it if needed.
///
/// With `overwrite` false, existing non-directory paths are kept and counted
/// as skipped. Members that would land outside `target_dir` are ignored.
pub fn extract_archive(archive_path: &Path, target_dir: &Path, overwrite: bool) -> Result<RestoreSummary> {
    let file = File::open(archive_path).map_err(|e| BackupError::from_io(e, archive_path))?;
    fs::create_dir_all(target_dir)?;

    info!(
        "Restoring {} into {}",
        archive_path.display(),
        target_dir.display()
    );

    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(overwrite);

    let mut summary = RestoreSummary::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();

        if !overwrite && entry.header().entry_type() != EntryType::Directory {
            let destination = target_dir.join(&relative);
            if fs::symlink_metadata(&destination).is_ok() {
                debug!("Keeping existing {}", destination.display());
                summary.skipped += 1;
                continue;
            }
        }

        if entry.unpack_in(target_dir)? {
            summary.restored += 1;
        } else {
            debug!("Ignoring member outside target: {}", relative.display());
        }
    }

    info!(
        "Restore complete: {} restored, {} skipped",
        summary.restored, summary.skipped
    );
    Ok(summary)
}

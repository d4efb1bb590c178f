//! Copying finished archives to their destinations.

use super::progress::{CopyStats, CopyTimer};
use crate::{BackupError, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Copy `src` to `dst`, replacing `dst` if it exists, and flush it to disk.
pub fn copy_file(src: &Path, dst: &Path) -> Result<CopyStats> {
    let timer = CopyTimer::start();

    let source = File::open(src).map_err(|e| BackupError::from_io(e, src))?;
    let target = File::create(dst).map_err(|e| BackupError::from_io(e, dst))?;

    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(target);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;

    let target = writer.into_inner().map_err(|e| e.into_error())?;
    target.sync_all()?;

    Ok(timer.finish(bytes))
}

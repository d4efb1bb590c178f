//! Streaming tar+gzip archive creation.
//!
//! The source tree is walked once and every included entry is appended to a
//! tar stream wrapped in a gzip encoder wrapped around the output file.
//! Regular files above [`RECOMMENDED_MAX_FILE_SIZE`] get a PAX extended header
//! so their size survives readers limited to the classic 11-digit octal field.

use crate::fs::metadata::{EntryKind, FileMetadata};
use crate::fs::size::RECOMMENDED_MAX_FILE_SIZE;
use crate::fs::walker::{walk_tree, FileInfo, WalkOptions};
use crate::{BackupError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder as TarBuilder, EntryType, Header};
use tracing::{debug, info, warn};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Options for archive creation.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Gzip level (1-9)
    pub compression_level: u32,

    /// Scratch area whose contents are never archived (unless the source
    /// itself lives inside it)
    pub scratch_dir: Option<PathBuf>,

    /// Other subtrees to leave out, such as destinations inside the source
    pub skip_paths: Vec<PathBuf>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            scratch_dir: None,
            skip_paths: Vec::new(),
        }
    }
}

impl ArchiveOptions {
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_skip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_paths.push(path.into());
        self
    }
}

/// What ended up in an archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    /// Uncompressed bytes of file content
    pub content_bytes: u64,
    /// Members written with a PAX extended header
    pub extended_headers: usize,
    /// Size of the compressed archive on disk
    pub archive_bytes: u64,
}

/// Header for one archive member, plus PAX records when the member needs them.
pub struct MemberHeader {
    pub header: Header,
    pub pax: Option<Vec<(&'static str, String)>>,
}

/// Builds the header for a member. Only regular files above the recommended
/// limit use the extended format; everything else gets a GNU header.
pub fn member_header(relative_path: &Path, metadata: &FileMetadata) -> MemberHeader {
    let needs_pax = metadata.kind == EntryKind::File && metadata.size > RECOMMENDED_MAX_FILE_SIZE;

    let mut header = if needs_pax {
        Header::new_ustar()
    } else {
        Header::new_gnu()
    };

    let entry_type = match metadata.kind {
        EntryKind::Directory => EntryType::Directory,
        EntryKind::Symlink => EntryType::Symlink,
        _ => EntryType::Regular,
    };
    header.set_entry_type(entry_type);
    header.set_mode(metadata.mode());
    header.set_mtime(metadata.modified);
    header.set_size(if entry_type == EntryType::Regular {
        metadata.size
    } else {
        0
    });

    let pax = needs_pax.then(|| {
        vec![
            ("path", tar_path(relative_path)),
            ("size", metadata.size.to_string()),
        ]
    });

    MemberHeader { header, pax }
}

fn tar_path(relative_path: &Path) -> String {
    relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Archive builder for directory snapshots.
pub struct ArchiveBuilder {
    options: ArchiveOptions,
}

impl ArchiveBuilder {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    /// Archives `source_root` into `destination_file` as tar+gzip.
    ///
    /// On failure the partially written destination is removed.
    pub fn build<S: AsRef<str>>(
        &self,
        source_root: &Path,
        destination_file: &Path,
        patterns: &[S],
    ) -> Result<ArchiveSummary> {
        fs::metadata(source_root).map_err(|e| BackupError::from_io(e, source_root))?;

        info!(
            "Archiving {} -> {}",
            source_root.display(),
            destination_file.display()
        );

        match self.write_archive(source_root, destination_file, patterns) {
            Ok(summary) => {
                info!(
                    "Archive complete: {} files, {} directories, {} bytes compressed",
                    summary.files, summary.directories, summary.archive_bytes
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(destination_file) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove partial archive {}: {}",
                            destination_file.display(),
                            rm
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn write_archive<S: AsRef<str>>(
        &self,
        source_root: &Path,
        destination_file: &Path,
        patterns: &[S],
    ) -> Result<ArchiveSummary> {
        let file = File::create(destination_file)
            .map_err(|e| BackupError::from_io(e, destination_file))?;
        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.options.compression_level),
        );
        let mut tar = TarBuilder::new(encoder);

        let source_root = absolute(source_root);
        let mut walk = WalkOptions::with_excludes(patterns)
            .skip_path(&source_root, absolute(destination_file));
        if let Some(scratch) = &self.options.scratch_dir {
            walk = walk.skip_path(&source_root, absolute(scratch));
        }
        for path in &self.options.skip_paths {
            walk = walk.skip_path(&source_root, absolute(path));
        }

        let mut summary = ArchiveSummary {
            path: destination_file.to_path_buf(),
            ..ArchiveSummary::default()
        };

        walk_tree(&source_root, &walk, |info| {
            append_entry(&mut tar, info, &mut summary)
        })?;

        let encoder = tar.into_inner()?;
        let writer = encoder.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        summary.archive_bytes = file.metadata()?.len();
        Ok(summary)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn append_entry<W: Write>(
    tar: &mut TarBuilder<W>,
    info: &FileInfo,
    summary: &mut ArchiveSummary,
) -> Result<()> {
    let relative = &info.relative_path;
    let MemberHeader { mut header, pax } = member_header(relative, &info.metadata);

    match info.kind() {
        EntryKind::Directory => {
            tar.append_data(&mut header, relative, io::empty())?;
            summary.directories += 1;
        }
        EntryKind::Symlink => {
            let target = fs::read_link(&info.path)?;
            tar.append_link(&mut header, relative, &target)?;
            summary.symlinks += 1;
        }
        EntryKind::File => {
            let declared = info.size();
            if let Some(records) = &pax {
                debug!("Using PAX header for {} ({} bytes)", relative.display(), declared);
                tar.append_pax_extensions(records.iter().map(|(k, v)| (*k, v.as_bytes())))?;
                summary.extended_headers += 1;
            }

            let file = File::open(&info.path).map_err(|e| BackupError::from_io(e, &info.path))?;
            tar.append_data(&mut header, relative, SizedReader::new(file, declared))
                .map_err(|e| classify_stream_error(e, relative, declared))?;

            summary.files += 1;
            summary.content_bytes += declared;
        }
        EntryKind::Other => {
            debug!("Skipping special file {}", relative.display());
        }
    }

    Ok(())
}

/// Marker carried inside an `io::Error` when a member outgrows its header.
#[derive(Debug)]
struct MemberOverflow;

impl fmt::Display for MemberOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("write too long for declared member size")
    }
}

impl std::error::Error for MemberOverflow {}

fn classify_stream_error(err: io::Error, relative: &Path, declared: u64) -> BackupError {
    let overflow = err
        .get_ref()
        .is_some_and(|inner| inner.downcast_ref::<MemberOverflow>().is_some());

    if overflow {
        BackupError::ArchiveTooLarge {
            path: relative.to_path_buf(),
            declared,
        }
    } else {
        BackupError::Io(err)
    }
}

/// Yields exactly `remaining` bytes from `inner`.
///
/// Extra bytes (the file grew after its header was written) fail with
/// [`MemberOverflow`]; running dry early fails with `UnexpectedEof`.
struct SizedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(io::Error::other(MemberOverflow)),
            };
        }

        let max = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while being archived",
            ));
        }

        self.remaining -= n as u64;
        Ok(n)
    }
}

//! Archive creation, naming and restore.

pub mod builder;
pub mod extract;
pub mod naming;

pub use builder::{ArchiveBuilder, ArchiveOptions, ArchiveSummary};
pub use extract::{extract_archive, RestoreSummary};
pub use naming::{
    archive_name, archive_prefix, encrypted_name, is_archive_name, parse_archive_name,
    sidecar_name, ParsedArchiveName,
};

//! Archive and sidecar file naming.
//!
//! Every place that builds or takes apart an archive file name goes through
//! this module, so the executor and the rotation engine always agree on which
//! sidecar belongs to which archive.

use chrono::NaiveDateTime;
use std::path::Path;

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const ENCRYPTED_SUFFIX: &str = ".gpg";
pub const SIDECAR_EXTENSION: &str = "backup.yaml";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Prefix used when the source directory has no usable name (e.g. `/`).
pub const FALLBACK_SOURCE_NAME: &str = "dirsnap";

/// Container suffixes stripped, in order, after the encryption suffix.
const CONTAINER_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".gz", ".tar"];

/// Base name of a source directory as used in archive names.
pub fn source_base_name(source: &Path) -> String {
    match source.file_name().map(|n| n.to_string_lossy()) {
        Some(name) if !name.is_empty() && name != "." => name.into_owned(),
        _ => FALLBACK_SOURCE_NAME.to_string(),
    }
}

/// Rotation prefix for archives of `source`: `<base>-`.
pub fn archive_prefix(source: &Path) -> String {
    format!("{}-", source_base_name(source))
}

/// `<base>-<YYYYMMDD-HHMMSS>.tar.gz`
pub fn archive_name(source: &Path, at: NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        archive_prefix(source),
        at.format(TIMESTAMP_FORMAT),
        ARCHIVE_SUFFIX
    )
}

pub fn encrypted_name(archive_name: &str) -> String {
    format!("{}{}", archive_name, ENCRYPTED_SUFFIX)
}

/// True for `*.tar.gz` and `*.tar.gz.gpg`.
pub fn is_archive_name(name: &str) -> bool {
    let plain = name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(name);
    plain.len() > ARCHIVE_SUFFIX.len() && plain.ends_with(ARCHIVE_SUFFIX)
}

pub fn is_encrypted_name(name: &str) -> bool {
    name.ends_with(ENCRYPTED_SUFFIX)
}

/// Removes the encryption suffix, then one container suffix.
pub fn strip_archive_suffixes(name: &str) -> &str {
    let name = name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(name);
    CONTAINER_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

/// `<archive name without suffixes>.backup.yaml`
pub fn sidecar_name(archive_name: &str) -> String {
    format!("{}.{}", strip_archive_suffixes(archive_name), SIDECAR_EXTENSION)
}

/// Components recovered from a generated archive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArchiveName {
    pub source: String,
    pub timestamp: NaiveDateTime,
    pub encrypted: bool,
}

/// Parses `<source>-<YYYYMMDD>-<HHMMSS>.tar.gz[.gpg]`. Sources may contain `-`.
pub fn parse_archive_name(name: &str) -> Option<ParsedArchiveName> {
    if !is_archive_name(name) {
        return None;
    }

    let stem = strip_archive_suffixes(name);
    let mut parts = stem.rsplitn(3, '-');
    let time = parts.next()?;
    let date = parts.next()?;
    let source = parts.next()?;
    if source.is_empty() {
        return None;
    }

    let timestamp =
        NaiveDateTime::parse_from_str(&format!("{}-{}", date, time), TIMESTAMP_FORMAT).ok()?;

    Some(ParsedArchiveName {
        source: source.to_string(),
        timestamp,
        encrypted: is_encrypted_name(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_archive_name_format() {
        let name = archive_name(Path::new("/home/me/project"), at(2024, 1, 5, 9, 3, 7));
        assert_eq!(name, "project-20240105-090307.tar.gz");
        assert_eq!(encrypted_name(&name), "project-20240105-090307.tar.gz.gpg");
    }

    #[test]
    fn test_fallback_source_name() {
        assert_eq!(source_base_name(Path::new("/")), "dirsnap");
        assert_eq!(archive_prefix(Path::new("/")), "dirsnap-");
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let source = Path::new("job");
        let earlier = archive_name(source, at(2023, 12, 31, 23, 59, 59));
        let later = archive_name(source, at(2024, 1, 1, 0, 0, 0));
        assert!(earlier < later);
    }

    #[test]
    fn test_archive_suffix_recognition() {
        assert!(is_archive_name("job-20240101-000000.tar.gz"));
        assert!(is_archive_name("job-20240101-000000.tar.gz.gpg"));
        assert!(!is_archive_name("job-20240101-000000.backup.yaml"));
        assert!(!is_archive_name("job-20240101-000000.zip"));
        assert!(!is_archive_name(".tar.gz"));
    }

    #[test]
    fn test_sidecar_name_strips_all_suffixes() {
        assert_eq!(
            sidecar_name("job-20240101-000000.tar.gz"),
            "job-20240101-000000.backup.yaml"
        );
        assert_eq!(
            sidecar_name("job-20240101-000000.tar.gz.gpg"),
            "job-20240101-000000.backup.yaml"
        );
        assert_eq!(sidecar_name("nightly.tgz"), "nightly.backup.yaml");
        assert_eq!(sidecar_name("nightly.bin"), "nightly.bin.backup.yaml");
    }

    #[test]
    fn test_parse_archive_name() {
        let parsed = parse_archive_name("my-app-20240105-090307.tar.gz.gpg").unwrap();
        assert_eq!(parsed.source, "my-app");
        assert_eq!(parsed.timestamp, at(2024, 1, 5, 9, 3, 7));
        assert!(parsed.encrypted);

        assert!(parse_archive_name("backup.tar.gz").is_none());
        assert!(parse_archive_name("job-2024-bad.tar.gz").is_none());
        assert!(parse_archive_name("-20240105-090307.tar.gz").is_none());
    }
}

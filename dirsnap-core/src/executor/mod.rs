//! Backup run executor - orchestrates one snapshot of a job directory.
//!
//! A run archives the source once into the scratch directory, optionally
//! encrypts it, then walks the configured targets in order: copy, rotate,
//! record history and status, write the sidecar. Per-destination failures are
//! recorded and the run moves on; only configuration problems and a failed
//! archive stop it outright.

pub mod sidecar;

use crate::archive::builder::{ArchiveBuilder, ArchiveOptions, ArchiveSummary};
use crate::archive::naming::{archive_name, archive_prefix, encrypted_name, sidecar_name};
use crate::config::Settings;
use crate::encrypt::Encryptor;
use crate::fs::size::{analyze, SizeSummary};
use crate::models::{BackupConfiguration, BackupRecord, BackupTarget, Destination, RunOutcome};
use crate::retention::{rotate, RotationOutcome};
use crate::store::{self, RegistryUpdate};
use crate::transfer::{copy_file, format_bytes, format_speed};
use crate::{BackupError, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sidecar::SidecarContext;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Everything a run needs from the outside world.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Directory being backed up; relative destinations resolve against it
    pub job_dir: PathBuf,
    pub config_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub registry_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub compression_level: u32,
    pub large_file_threshold: u64,
    /// Used when the job configuration has no excludes of its own
    pub default_excludes: Vec<String>,
    /// Added to whatever excludes apply
    pub extra_excludes: Vec<String>,
    /// Overrides the configured recipient
    pub encrypt_to: Option<String>,
    pub skip_encryption: bool,
    pub write_sidecars: bool,
}

impl RunRequest {
    pub fn from_settings(settings: &Settings, job_dir: &Path, started_at: DateTime<Utc>) -> Self {
        Self {
            job_dir: job_dir.to_path_buf(),
            config_path: settings.config_path(job_dir),
            scratch_dir: settings.scratch_dir.clone(),
            registry_path: settings.registry_path.clone(),
            started_at,
            compression_level: settings.compression_level,
            large_file_threshold: settings.large_file_threshold,
            default_excludes: settings.default_excludes.clone(),
            extra_excludes: Vec::new(),
            encrypt_to: None,
            skip_encryption: false,
            write_sidecars: true,
        }
    }
}

/// Result for one target.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationReport {
    pub destination: Destination,
    pub outcome: RunOutcome,
    pub message: String,
    /// Where the archive was copied
    pub path: Option<PathBuf>,
    pub bytes: u64,
    pub rotation: Option<RotationOutcome>,
    pub sidecar: Option<PathBuf>,
}

impl DestinationReport {
    fn failed(destination: &Destination, message: impl Into<String>) -> Self {
        Self {
            destination: destination.clone(),
            outcome: RunOutcome::Failure,
            message: message.into(),
            path: None,
            bytes: 0,
            rotation: None,
            sidecar: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub archive_name: String,
    pub archive: ArchiveSummary,
    pub encrypted_for: Option<String>,
    pub destinations: Vec<DestinationReport>,
    pub history_saved: bool,
    pub registry: Option<RegistryUpdate>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.outcome == RunOutcome::Failure)
            .count()
    }

    pub fn all_failed(&self) -> bool {
        !self.destinations.is_empty() && self.failures() == self.destinations.len()
    }
}

/// Files in the scratch directory that belong to this run.
/// Removed when the run ends, however it ends.
struct ScratchFiles(Vec<PathBuf>);

impl ScratchFiles {
    fn track(&mut self, path: PathBuf) {
        self.0.push(path);
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove temporary file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// The payload copied to every destination.
struct Payload<'a> {
    path: &'a Path,
    /// Name used inside directory targets
    name: &'a str,
    recipient: Option<&'a str>,
}

pub struct BackupExecutor {
    request: RunRequest,
    source: PathBuf,
}

impl BackupExecutor {
    pub fn new(request: RunRequest) -> Self {
        let source =
            std::path::absolute(&request.job_dir).unwrap_or_else(|_| request.job_dir.clone());
        Self { request, source }
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn load_configuration(&self) -> Result<BackupConfiguration> {
        store::load(&self.request.config_path)
    }

    /// Exclusion patterns in effect for `configuration`.
    pub fn patterns(&self, configuration: &BackupConfiguration) -> Vec<String> {
        let mut patterns = if configuration.excludes.is_empty() {
            self.request.default_excludes.clone()
        } else {
            configuration.excludes.clone()
        };
        patterns.extend(self.request.extra_excludes.iter().cloned());
        patterns
    }

    /// Size analysis of the source against the large-file threshold.
    pub fn preflight(&self, configuration: &BackupConfiguration) -> Result<SizeSummary> {
        analyze(
            &self.source,
            &self.patterns(configuration),
            self.request.large_file_threshold,
        )
    }

    fn recipient(&self, configuration: &BackupConfiguration) -> Option<String> {
        if self.request.skip_encryption {
            return None;
        }
        self.request
            .encrypt_to
            .clone()
            .or_else(|| configuration.encryption.as_ref().map(|e| e.receiver.clone()))
    }

    /// Checks that must pass before anything is written.
    fn validate(
        &self,
        configuration: &BackupConfiguration,
        encryptor: Option<&dyn Encryptor>,
    ) -> Result<Option<String>> {
        if configuration.targets.is_empty() {
            return Err(BackupError::Validation(format!(
                "no backup targets configured in {}",
                self.request.config_path.display()
            )));
        }
        configuration.validate()?;

        let Some(recipient) = self.recipient(configuration) else {
            return Ok(None);
        };
        if recipient.trim().is_empty() {
            return Err(BackupError::Validation(
                "encryption is enabled but no recipient is set".into(),
            ));
        }

        let encryptor = encryptor.ok_or_else(|| {
            BackupError::Validation("encryption is enabled but no encryptor is available".into())
        })?;
        if let Some(settings) = &configuration.encryption {
            if !settings.method.eq_ignore_ascii_case(encryptor.method()) {
                return Err(BackupError::Validation(format!(
                    "configured encryption method '{}' does not match '{}'",
                    settings.method,
                    encryptor.method()
                )));
            }
        }

        Ok(Some(recipient))
    }

    /// Runs the backup, consuming the configuration and saving it back.
    pub fn execute(
        &self,
        mut configuration: BackupConfiguration,
        encryptor: Option<&dyn Encryptor>,
    ) -> Result<RunReport> {
        let recipient = self.validate(&configuration, encryptor)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("backup_run", run_id = %run_id);
        let _enter = span.enter();

        let started_local = self.request.started_at.with_timezone(&Local).naive_local();
        let plain_name = archive_name(&self.source, started_local);
        info!("Starting backup of {} as {}", self.source.display(), plain_name);

        fs::create_dir_all(&self.request.scratch_dir)
            .map_err(|e| BackupError::from_io(e, &self.request.scratch_dir))?;
        let mut scratch = ScratchFiles(Vec::new());
        let temp_archive = self
            .request
            .scratch_dir
            .join(format!("{}-{}", run_id.simple(), plain_name));
        scratch.track(temp_archive.clone());

        let archive = match self.build_archive(&configuration, &temp_archive) {
            Ok(summary) => summary,
            Err(e) => {
                self.record_global_failure(&mut configuration, &e);
                return Err(e);
            }
        };

        let (payload_path, payload_name) = match (&recipient, encryptor) {
            (Some(recipient), Some(encryptor)) => {
                let encrypted = match encryptor.encrypt(&temp_archive, recipient) {
                    Ok(path) => path,
                    Err(e) => {
                        self.record_global_failure(&mut configuration, &e);
                        return Err(e);
                    }
                };
                scratch.track(encrypted.clone());
                (encrypted, encrypted_name(&plain_name))
            }
            _ => (temp_archive.clone(), plain_name.clone()),
        };

        let payload = Payload {
            path: &payload_path,
            name: &payload_name,
            recipient: recipient.as_deref(),
        };

        let destinations: Vec<Destination> = configuration
            .targets
            .iter()
            .map(|t| t.destination.clone())
            .collect();

        let mut reports = Vec::with_capacity(destinations.len());
        for destination in &destinations {
            let report = match self.deliver(&mut configuration, destination, &payload) {
                Ok(report) => report,
                Err(e) => {
                    warn!("Destination {} failed: {}", destination, e);
                    DestinationReport::failed(destination, e.to_string())
                }
            };

            if report.outcome == RunOutcome::Failure {
                configuration.set_run_status(
                    destination,
                    RunOutcome::Failure,
                    report.message.clone(),
                    self.request.started_at,
                );
            }
            reports.push(report);
        }

        let history_saved = self.save(&configuration);
        let registry = self.update_registry();

        let report = RunReport {
            run_id,
            source: self.source.clone(),
            archive_name: payload_name.clone(),
            archive,
            encrypted_for: recipient,
            destinations: reports,
            history_saved,
            registry,
        };

        info!(
            "Backup finished: {} of {} destination(s) succeeded",
            report.destinations.len() - report.failures(),
            report.destinations.len()
        );
        Ok(report)
    }

    fn build_archive(&self, configuration: &BackupConfiguration, output: &Path) -> Result<ArchiveSummary> {
        let mut options = ArchiveOptions::default()
            .with_compression_level(self.request.compression_level)
            .with_scratch_dir(&self.request.scratch_dir);

        for target in &configuration.targets {
            let resolved = target.destination.resolve(&self.source);
            if !resolved.starts_with(&self.source) || resolved == self.source {
                continue;
            }
            if let (Destination::File(_), Some(name)) = (&target.destination, resolved.file_name()) {
                // The file itself and its sidecar; siblings are still archived.
                let sidecar = resolved.with_file_name(sidecar_name(&name.to_string_lossy()));
                options = options.with_skip_path(sidecar);
            }
            options = options.with_skip_path(resolved);
        }

        ArchiveBuilder::new(options).build(&self.source, output, &self.patterns(configuration))
    }

    fn deliver(
        &self,
        configuration: &mut BackupConfiguration,
        destination: &Destination,
        payload: &Payload<'_>,
    ) -> Result<DestinationReport> {
        let resolved = destination.resolve(&self.source);

        let (copy_path, record_name, sidecar_dir) = match destination {
            Destination::Directory(_) => {
                if !resolved.is_dir() {
                    warn!("Skipping {}: directory does not exist", resolved.display());
                    return Ok(DestinationReport::failed(
                        destination,
                        "destination directory does not exist",
                    ));
                }
                (resolved.join(payload.name), payload.name.to_string(), resolved.clone())
            }
            Destination::File(_) => {
                let parent = resolved
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.source.clone());
                fs::create_dir_all(&parent)?;
                let name = resolved
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        BackupError::Validation(format!("file target {} has no file name", destination))
                    })?;
                (resolved.clone(), name, parent)
            }
        };

        info!("Copying to {}", copy_path.display());
        let stats = copy_file(payload.path, &copy_path)?;
        info!(
            "Copied {} in {:.1}s ({})",
            format_bytes(stats.bytes),
            stats.elapsed.as_secs_f64(),
            format_speed(stats.bytes_per_second())
        );

        let mut message = String::new();
        let rotation = match destination {
            Destination::Directory(_) => {
                let max = configuration
                    .find_target(destination)
                    .map(BackupTarget::history_limit)
                    .unwrap_or(crate::models::DEFAULT_MAX_BACKUPS);
                match rotate(&resolved, &archive_prefix(&self.source), max) {
                    Ok(outcome) => {
                        if let Some(partial) = outcome.partial_failure(&resolved) {
                            warn!("{}", partial);
                            message = partial.to_string();
                        }
                        Some(outcome)
                    }
                    Err(e) => {
                        warn!("Rotation in {} failed: {}", resolved.display(), e);
                        message = format!("rotation failed: {}", e);
                        None
                    }
                }
            }
            Destination::File(_) => None,
        };

        configuration.append_record(
            destination,
            BackupRecord {
                filename: record_name.clone(),
                source: self.source.clone(),
                created_at: self.request.started_at,
                size: stats.bytes,
            },
        );
        configuration.set_run_status(
            destination,
            RunOutcome::Success,
            message.clone(),
            self.request.started_at,
        );

        let sidecar = if self.request.write_sidecars {
            let path = sidecar_dir.join(sidecar_name(&record_name));
            let context = SidecarContext {
                archive_name: &record_name,
                source: &self.source,
                created_at: self.request.started_at,
                recipient: payload.recipient,
            };
            match sidecar::write(&path, &context, configuration) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Failed to write sidecar {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(DestinationReport {
            destination: destination.clone(),
            outcome: RunOutcome::Success,
            message,
            path: Some(copy_path),
            bytes: stats.bytes,
            rotation,
            sidecar,
        })
    }

    /// Marks every target failed after an error that happened before any
    /// copy, and persists that.
    fn record_global_failure(&self, configuration: &mut BackupConfiguration, error: &BackupError) {
        let destinations: Vec<_> = configuration
            .targets
            .iter()
            .map(|t| t.destination.clone())
            .collect();
        for destination in &destinations {
            configuration.set_run_status(
                destination,
                RunOutcome::Failure,
                error.to_string(),
                self.request.started_at,
            );
        }
        self.save(configuration);
    }

    fn save(&self, configuration: &BackupConfiguration) -> bool {
        match store::save(&self.request.config_path, configuration, self.request.started_at) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to update backup history in {}: {}",
                    self.request.config_path.display(),
                    e
                );
                false
            }
        }
    }

    fn update_registry(&self) -> Option<RegistryUpdate> {
        let path = self.request.registry_path.as_ref()?;
        let location = self
            .request
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(&self.source);

        match store::update_registry(path, location, self.request.started_at) {
            Ok(update) => Some(update),
            Err(e) => {
                warn!("Failed to update registry {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupTarget;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        job: PathBuf,
        scratch: PathBuf,
        backups: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let job = root.path().join("job");
        let scratch = root.path().join("scratch");
        let backups = root.path().join("backups");
        fs::create_dir_all(job.join("src")).unwrap();
        fs::create_dir_all(&backups).unwrap();
        fs::write(job.join("src/main.rs"), "fn main() {}").unwrap();
        Fixture {
            job,
            scratch,
            backups,
            _root: root,
        }
    }

    fn request(f: &Fixture) -> RunRequest {
        RunRequest {
            job_dir: f.job.clone(),
            config_path: f.job.join(".backup.yaml"),
            scratch_dir: f.scratch.clone(),
            registry_path: None,
            started_at: Utc.with_ymd_and_hms(2024, 1, 5, 9, 3, 7).unwrap(),
            compression_level: 1,
            large_file_threshold: 1024,
            default_excludes: vec!["node_modules".into()],
            extra_excludes: Vec::new(),
            encrypt_to: None,
            skip_encryption: false,
            write_sidecars: true,
        }
    }

    #[test]
    fn test_empty_target_list_is_validation_error() {
        let f = fixture();
        let executor = BackupExecutor::new(request(&f));
        let err = executor
            .execute(BackupConfiguration::default(), None)
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(!f.job.join(".backup.yaml").exists());
    }

    #[test]
    fn test_encryption_without_encryptor_is_rejected_up_front() {
        let f = fixture();
        let mut req = request(&f);
        req.encrypt_to = Some("me@example.com".into());
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(&f.backups));

        let err = BackupExecutor::new(req).execute(cfg, None).unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
        assert_eq!(fs::read_dir(&f.backups).unwrap().count(), 0);
    }

    #[test]
    fn test_patterns_fall_back_to_defaults() {
        let f = fixture();
        let mut req = request(&f);
        req.extra_excludes = vec!["*.tmp".into()];
        let executor = BackupExecutor::new(req);

        let cfg = BackupConfiguration::default();
        assert_eq!(executor.patterns(&cfg), vec!["node_modules", "*.tmp"]);

        let cfg = BackupConfiguration {
            excludes: vec!["dist".into()],
            ..BackupConfiguration::default()
        };
        assert_eq!(executor.patterns(&cfg), vec!["dist", "*.tmp"]);
    }

    #[test]
    fn test_missing_directory_target_recorded_as_failure() {
        let f = fixture();
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(f.backups.join("unplugged")));
        cfg.add_target(BackupTarget::directory(&f.backups));

        let report = BackupExecutor::new(request(&f)).execute(cfg, None).unwrap();

        assert_eq!(report.failures(), 1);
        assert!(!report.all_failed());
        let saved = store::load(&f.job.join(".backup.yaml")).unwrap();
        let failed = saved.targets[0].last_run.as_ref().unwrap();
        assert_eq!(failed.status, RunOutcome::Failure);
        assert!(saved.targets[0].backups.is_empty());
        assert_eq!(saved.targets[1].backups.len(), 1);
    }

    #[test]
    fn test_scratch_is_cleaned_up() {
        let f = fixture();
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(&f.backups));

        BackupExecutor::new(request(&f)).execute(cfg, None).unwrap();

        assert_eq!(fs::read_dir(&f.scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_destination_inside_source_not_archived() {
        let f = fixture();
        let inner = f.job.join(".backups/location1");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("job-20000101-000000.tar.gz"), "old").unwrap();
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(".backups/location1"));

        let report = BackupExecutor::new(request(&f)).execute(cfg, None).unwrap();

        assert_eq!(report.failures(), 0);
        assert_eq!(report.archive.files, 1);
        assert!(inner.join(&report.archive_name).is_file());
    }

    fn member_names(archive: &Path) -> Vec<String> {
        let decoder = flate2::read::GzDecoder::new(fs::File::open(archive).unwrap());
        let mut archive = tar::Archive::new(decoder);
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect()
    }

    #[test]
    fn test_file_target_inside_source_keeps_siblings() {
        let f = fixture();
        fs::create_dir_all(f.job.join("docs")).unwrap();
        fs::write(f.job.join("docs/guide.md"), "guide").unwrap();
        let target = || {
            let mut cfg = BackupConfiguration::default();
            cfg.add_target(BackupTarget::file("docs/latest.tar.gz"));
            cfg
        };

        BackupExecutor::new(request(&f)).execute(target(), None).unwrap();
        let latest = f.job.join("docs/latest.tar.gz");
        assert!(f.job.join("docs").join(sidecar_name("latest.tar.gz")).is_file());

        let mut again = request(&f);
        again.started_at = Utc.with_ymd_and_hms(2024, 1, 6, 9, 3, 7).unwrap();
        let report = BackupExecutor::new(again).execute(target(), None).unwrap();

        assert_eq!(report.failures(), 0);
        let members = member_names(&latest);
        assert!(members.contains(&"docs/guide.md".to_string()));
        assert!(members.contains(&"src/main.rs".to_string()));
        assert!(!members.contains(&"docs/latest.tar.gz".to_string()));
        assert!(!members.iter().any(|m| m.ends_with(&sidecar_name("latest.tar.gz"))));
    }

    #[test]
    fn test_preflight_flags_large_files() {
        let f = fixture();
        fs::write(f.job.join("big.bin"), vec![0u8; 4096]).unwrap();
        let executor = BackupExecutor::new(request(&f));

        let summary = executor.preflight(&BackupConfiguration::default()).unwrap();
        assert_eq!(summary.over_threshold, vec![PathBuf::from("big.bin")]);
    }
}

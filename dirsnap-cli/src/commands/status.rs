//! `dirsnap status`: per-target overview of the job.

use crate::context::Context;
use crate::output;
use chrono::{DateTime, Utc};
use dirsnap_core::models::RunStatus;
use dirsnap_core::transfer::{format_age, format_bytes};
use dirsnap_core::{BackupConfiguration, BackupTarget, Destination};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct TargetStatus {
    pub destination: Destination,
    pub max_backups: usize,
    pub history: usize,
    pub latest: Option<String>,
    pub latest_at: Option<DateTime<Utc>>,
    pub latest_bytes: Option<u64>,
    /// Whether the newest recorded archive is still where it was copied
    pub on_disk: bool,
    pub last_run: Option<RunStatus>,
}

#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub job_dir: PathBuf,
    pub encryption: Option<String>,
    pub excludes: Vec<String>,
    pub targets: Vec<TargetStatus>,
}

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let configuration = ctx.load_configuration()?;
    let status = job_status(&ctx.job_dir, &configuration);

    if ctx.json {
        return output::json(&status);
    }

    let now = Utc::now();
    output::header(&format!("Backups of {}", status.job_dir.display()));
    output::kv("Encryption", status.encryption.as_deref().unwrap_or("disabled"));
    output::kv("Excludes", &status.excludes.join(", "));

    if status.targets.is_empty() {
        output::warning("No targets configured (add one with `dirsnap target add`)");
        return Ok(());
    }

    for target in &status.targets {
        output::header(&format!("{} ({})", target.destination, target.destination.kind()));
        match (&target.latest, target.latest_at) {
            (Some(name), Some(at)) => {
                let presence = if target.on_disk { "" } else { " [missing]" };
                let age = match format_age(at, now) {
                    age if age == "just now" => age,
                    age => format!("{} ago", age),
                };
                output::kv("Latest", &format!("{} ({}){}", name, age, presence));
                if let Some(bytes) = target.latest_bytes {
                    output::kv("Size", &format_bytes(bytes));
                }
            }
            _ => output::kv("Latest", "never"),
        }
        if !target.destination.is_file() {
            output::kv("History", &format!("{} / {}", target.history, target.max_backups));
        }
        if let Some(last_run) = &target.last_run {
            let mut line = format!(
                "{} at {}",
                last_run.status,
                last_run.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            if !last_run.message.is_empty() {
                line.push_str(&format!(": {}", last_run.message));
            }
            output::kv("Last run", &line);
        }
    }
    Ok(())
}

pub fn job_status(job_dir: &Path, configuration: &BackupConfiguration) -> JobStatus {
    JobStatus {
        job_dir: job_dir.to_path_buf(),
        encryption: configuration
            .encryption
            .as_ref()
            .map(|e| format!("{} for {}", e.method, e.receiver)),
        excludes: configuration.excludes.clone(),
        targets: configuration
            .targets
            .iter()
            .map(|t| target_status(job_dir, t))
            .collect(),
    }
}

fn target_status(job_dir: &Path, target: &BackupTarget) -> TargetStatus {
    let resolved = target.destination.resolve(job_dir);
    let latest = target.latest();
    let on_disk = match (&target.destination, latest) {
        (Destination::File(_), Some(_)) => resolved.is_file(),
        (Destination::Directory(_), Some(record)) => resolved.join(&record.filename).is_file(),
        (_, None) => false,
    };

    TargetStatus {
        destination: target.destination.clone(),
        max_backups: target.history_limit(),
        history: target.backups.len(),
        latest: latest.map(|r| r.filename.clone()),
        latest_at: latest.map(|r| r.created_at),
        latest_bytes: latest.map(|r| r.size),
        on_disk,
        last_run: target.last_run.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dirsnap_core::BackupRecord;
    use std::fs;
    use tempfile::TempDir;

    fn record(name: &str) -> BackupRecord {
        BackupRecord {
            filename: name.into(),
            source: "/job".into(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            size: 10,
        }
    }

    #[test]
    fn test_presence_on_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("job-20240601-120000.tar.gz"), "x").unwrap();

        let mut present = BackupTarget::directory(dir.path()).with_max_backups(3);
        present.backups.push(record("job-20240601-120000.tar.gz"));
        let mut gone = BackupTarget::directory(dir.path().join("elsewhere"));
        gone.backups.push(record("job-20240601-120000.tar.gz"));
        let never = BackupTarget::file("latest.tar.gz");

        let cfg = BackupConfiguration {
            targets: vec![present, gone, never],
            ..BackupConfiguration::default()
        };
        let status = job_status(dir.path(), &cfg);

        assert!(status.targets[0].on_disk);
        assert_eq!(status.targets[0].history, 1);
        assert_eq!(status.targets[0].max_backups, 3);
        assert!(!status.targets[1].on_disk);
        assert_eq!(status.targets[2].latest, None);
        assert_eq!(status.targets[2].max_backups, 1);
        assert!(status.encryption.is_none());
    }
}

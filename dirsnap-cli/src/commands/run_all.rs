//! `dirsnap run-all`: every job location in the global registry, in order.

use super::run::{print_report, select_encryptor};
use crate::cli::RunAllArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;
use chrono::Utc;
use dirsnap_core::store::read_registry;
use dirsnap_core::{BackupError, BackupExecutor, RunRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct JobResult {
    location: PathBuf,
    ok: bool,
    message: String,
}

pub fn run(ctx: &Context, args: RunAllArgs) -> anyhow::Result<()> {
    let registry_path = ctx
        .settings
        .registry_path
        .clone()
        .ok_or_else(|| CliError::Usage("no registry path configured".into()))?;
    let registry = read_registry(&registry_path)?
        .ok_or_else(|| BackupError::NotFound(registry_path.clone()))?;

    let total = registry.backups.len();
    info!("Running {} job(s) from {}", total, registry_path.display());

    let mut results = Vec::with_capacity(total);
    for entry in &registry.backups {
        if !ctx.json {
            output::header(&entry.location.display().to_string());
        }

        let result = match run_job(ctx, &entry.location, args.force) {
            Ok(message) => JobResult {
                location: entry.location.clone(),
                ok: true,
                message,
            },
            Err(e) => {
                warn!("Job {} failed: {:#}", entry.location.display(), e);
                if !ctx.json {
                    output::error(&format!("{:#}", e));
                }
                JobResult {
                    location: entry.location.clone(),
                    ok: false,
                    message: format!("{:#}", e),
                }
            }
        };

        let stop = !result.ok && !args.keep_going;
        results.push(result);
        if stop {
            break;
        }
    }

    let failed = results.iter().filter(|r| !r.ok).count();
    if ctx.json {
        output::json(&results)?;
    } else {
        output::header("Summary");
        for result in &results {
            if result.ok {
                output::success(&result.location.display().to_string());
            } else {
                output::error(&result.location.display().to_string());
            }
        }
        if results.len() < total {
            output::warning(&format!(
                "{} job(s) not attempted (use --continue to keep going after a failure)",
                total - results.len()
            ));
        }
    }

    if failed > 0 || results.len() < total {
        return Err(CliError::JobsFailed {
            failed: failed + (total - results.len()),
            total,
        }
        .into());
    }
    Ok(())
}

/// One job, non-interactively. Returns a one-line summary.
fn run_job(ctx: &Context, location: &Path, force: bool) -> anyhow::Result<String> {
    let request = RunRequest::from_settings(&ctx.settings, location, Utc::now());
    let executor = BackupExecutor::new(request);
    let configuration = executor.load_configuration()?;

    if !force {
        let summary = executor.preflight(&configuration)?;
        if !summary.over_threshold.is_empty() {
            return Err(CliError::Aborted(format!(
                "{} oversized file(s), skipped (use --force to archive them)",
                summary.over_threshold.len()
            ))
            .into());
        }
    }

    let encryptor = select_encryptor(executor.request(), &configuration)?;
    let started = Instant::now();
    let report = executor.execute(configuration, encryptor.as_deref())?;
    if !ctx.json {
        print_report(&report, started.elapsed());
    }

    match report.failures() {
        0 => Ok(format!("{} destination(s)", report.destinations.len())),
        failed => Err(CliError::DestinationsFailed {
            failed,
            total: report.destinations.len(),
        }
        .into()),
    }
}

//! `dirsnap run`

use crate::cli::RunArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;
use chrono::Utc;
use dialoguer::Confirm;
use dirsnap_core::encrypt::{encryptor_for, gpg, Encryptor};
use dirsnap_core::transfer::{format_bytes, format_duration};
use dirsnap_core::{BackupConfiguration, BackupExecutor, RunOutcome, RunReport, RunRequest};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

pub fn run(ctx: &Context, args: RunArgs) -> anyhow::Result<()> {
    let request = build_request(ctx, &args);
    let executor = BackupExecutor::new(request);
    let configuration = executor.load_configuration()?;

    if !args.force {
        confirm_large_files(&executor, &configuration)?;
    }

    let encryptor = select_encryptor(executor.request(), &configuration)?;
    let started = Instant::now();
    let report = executor.execute(configuration, encryptor.as_deref())?;

    if ctx.json {
        output::json(&report)?;
    } else {
        print_report(&report, started.elapsed());
    }

    match report.failures() {
        0 => Ok(()),
        failed => Err(CliError::DestinationsFailed {
            failed,
            total: report.destinations.len(),
        }
        .into()),
    }
}

fn build_request(ctx: &Context, args: &RunArgs) -> RunRequest {
    let mut request = RunRequest::from_settings(&ctx.settings, &ctx.job_dir, Utc::now());
    if let Some(config) = &args.config {
        request.config_path = ctx.job_dir.join(config);
    }
    request.extra_excludes = args.excludes.clone();
    request.encrypt_to = args.encrypt_to.clone();
    request.skip_encryption = args.no_encrypt;
    request.write_sidecars = !args.no_sidecar;
    request
}

/// Backend needed for this run, if it encrypts at all.
pub(crate) fn select_encryptor(
    request: &RunRequest,
    configuration: &BackupConfiguration,
) -> dirsnap_core::Result<Option<Box<dyn Encryptor>>> {
    if request.skip_encryption {
        return Ok(None);
    }
    let method = match (&configuration.encryption, &request.encrypt_to) {
        (Some(settings), _) => settings.method.as_str(),
        (None, Some(_)) => gpg::METHOD,
        (None, None) => return Ok(None),
    };
    encryptor_for(method).map(Some)
}

/// Asks before archiving files bigger than the configured threshold.
fn confirm_large_files(executor: &BackupExecutor, configuration: &BackupConfiguration) -> anyhow::Result<()> {
    let summary = executor.preflight(configuration)?;
    if summary.over_threshold.is_empty() {
        return Ok(());
    }

    output::warning(&format!(
        "{} file(s) exceed {}:",
        summary.over_threshold.len(),
        format_bytes(executor.request().large_file_threshold)
    ));
    for path in &summary.over_threshold {
        output::dim(&path.display().to_string());
    }

    if !std::io::stdin().is_terminal() {
        return Err(CliError::Aborted(
            "large files found and no terminal to confirm; pass --force to archive them anyway"
                .into(),
        )
        .into());
    }

    let proceed = Confirm::new()
        .with_prompt("Archive them anyway?")
        .default(false)
        .interact()?;
    if !proceed {
        return Err(CliError::Aborted("backup cancelled".into()).into());
    }
    Ok(())
}

pub(crate) fn print_report(report: &RunReport, elapsed: Duration) {
    output::header(&format!("Backup {}", report.archive_name));
    output::kv("Source", &report.source.display().to_string());
    output::kv(
        "Contents",
        &format!(
            "{} file(s), {} dir(s), {}",
            report.archive.files,
            report.archive.directories,
            format_bytes(report.archive.content_bytes)
        ),
    );
    output::kv("Archive", &format_bytes(report.archive.archive_bytes));
    if let Some(recipient) = &report.encrypted_for {
        output::kv("Encrypted for", recipient);
    }
    println!();

    for destination in &report.destinations {
        match destination.outcome {
            RunOutcome::Success => {
                let place = match &destination.path {
                    Some(path) => path.display().to_string(),
                    None => destination.destination.to_string(),
                };
                output::success(&format!("{} ({})", place, format_bytes(destination.bytes)));
                if let Some(rotation) = &destination.rotation {
                    if !rotation.deleted.is_empty() {
                        output::dim(&format!("removed {} old archive(s)", rotation.deleted.len()));
                    }
                }
                if !destination.message.is_empty() {
                    output::warning(&destination.message);
                }
            }
            RunOutcome::Failure => {
                output::error(&format!("{}: {}", destination.destination, destination.message));
            }
        }
    }

    if !report.history_saved {
        output::warning("Backup history could not be saved");
    }
    output::dim(&format!("finished in {}", format_duration(elapsed.as_secs())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sandbox;
    use dirsnap_core::models::EncryptionSettings;
    use dirsnap_core::store;
    use dirsnap_core::BackupTarget;
    use std::fs;

    #[test]
    fn test_run_writes_archive_and_history() {
        let sb = sandbox();
        let dest = sb.path("backups");
        fs::create_dir_all(&dest).unwrap();
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(&dest));
        sb.ctx.save_configuration(&cfg).unwrap();

        run(&sb.ctx, RunArgs::default()).unwrap();

        let saved = store::load(&sb.ctx.config_path()).unwrap();
        assert_eq!(saved.targets[0].backups.len(), 1);
        let archive = dest.join(&saved.targets[0].backups[0].filename);
        assert!(archive.is_file());
    }

    #[test]
    fn test_failed_destination_is_reported() {
        let sb = sandbox();
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(sb.path("unplugged")));
        sb.ctx.save_configuration(&cfg).unwrap();

        let err = run(&sb.ctx, RunArgs::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::DestinationsFailed { failed: 1, total: 1 })
        ));
    }

    #[test]
    fn test_options_flow_into_request() {
        let sb = sandbox();
        let args = RunArgs {
            config: Some("alt.yaml".into()),
            excludes: vec!["*.log".into()],
            no_encrypt: true,
            no_sidecar: true,
            ..RunArgs::default()
        };

        let request = build_request(&sb.ctx, &args);

        assert_eq!(request.config_path, sb.ctx.job_dir.join("alt.yaml"));
        assert_eq!(request.extra_excludes, vec!["*.log"]);
        assert!(request.skip_encryption);
        assert!(!request.write_sidecars);
    }

    #[test]
    fn test_encryptor_selection() {
        let sb = sandbox();
        let mut request = build_request(&sb.ctx, &RunArgs::default());
        let mut cfg = BackupConfiguration::default();

        assert!(select_encryptor(&request, &cfg).unwrap().is_none());

        request.encrypt_to = Some("me@example.com".into());
        let encryptor = select_encryptor(&request, &cfg).unwrap().unwrap();
        assert_eq!(encryptor.method(), "gpg");

        cfg.encryption = Some(EncryptionSettings {
            method: "age".into(),
            receiver: "me".into(),
            passphrase: None,
        });
        assert!(select_encryptor(&request, &cfg).is_err());

        request.skip_encryption = true;
        assert!(select_encryptor(&request, &cfg).unwrap().is_none());
    }
}

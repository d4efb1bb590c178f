//! `dirsnap restore`

use crate::cli::RestoreArgs;
use crate::context::Context;
use crate::output;
use dirsnap_core::archive::extract_archive;
use dirsnap_core::archive::naming::{is_encrypted_name, strip_archive_suffixes, ENCRYPTED_SUFFIX};
use dirsnap_core::archive::sidecar_name;
use dirsnap_core::encrypt::{encryptor_for, gpg};
use dirsnap_core::models::EncryptionSettings;
use dirsnap_core::store;
use dirsnap_core::{BackupConfiguration, BackupError, Destination};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decrypted copy in the scratch directory, removed on drop.
struct ScratchCopy(PathBuf);

impl Drop for ScratchCopy {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_file(&self.0) {
                warn!("Failed to remove {}: {}", self.0.display(), e);
            }
        }
    }
}

pub fn run(ctx: &Context, args: RestoreArgs) -> anyhow::Result<()> {
    let configuration = ctx.load_configuration().ok();
    let archive = locate_archive(&ctx.job_dir, configuration.as_ref(), &args.archive)?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::NotFound(archive.clone()))?;

    let target_dir = match &args.to {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?.join(strip_archive_suffixes(&name)),
    };

    let summary = if is_encrypted_name(&name) {
        let encryption = sidecar_encryption(&archive, &name)
            .or_else(|| configuration.and_then(|c| c.encryption));
        let method = encryption
            .as_ref()
            .map(|e| e.method.clone())
            .unwrap_or_else(|| gpg::METHOD.to_string());
        let passphrase = args
            .passphrase
            .clone()
            .or_else(|| encryption.and_then(|e| e.passphrase));

        let scratch_dir = &ctx.settings.scratch_dir;
        fs::create_dir_all(scratch_dir)?;
        let plain_name = name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(&name);
        let plain = ScratchCopy(scratch_dir.join(format!(
            "restore-{}-{}",
            std::process::id(),
            plain_name
        )));

        encryptor_for(&method)?.decrypt(&archive, &plain.0, passphrase.as_deref())?;
        extract_archive(&plain.0, &target_dir, args.overwrite)?
    } else {
        extract_archive(&archive, &target_dir, args.overwrite)?
    };

    if ctx.json {
        return output::json(&summary);
    }

    output::success(&format!(
        "Restored {} into {}",
        archive.display(),
        target_dir.display()
    ));
    output::kv("Restored", &summary.restored.to_string());
    if summary.skipped > 0 {
        output::kv(
            "Skipped",
            &format!("{} existing (use --overwrite to replace)", summary.skipped),
        );
    }
    Ok(())
}

/// Resolves `requested` as a path (absolute, or relative to the working or
/// job directory), then as a bare archive name inside the job's targets.
pub fn locate_archive(
    job_dir: &Path,
    configuration: Option<&BackupConfiguration>,
    requested: &Path,
) -> anyhow::Result<PathBuf> {
    if requested.is_file() {
        return Ok(requested.to_path_buf());
    }
    let in_job = job_dir.join(requested);
    if in_job.is_file() {
        return Ok(in_job);
    }

    if requested.components().count() == 1 {
        for target in configuration.map(|c| c.targets.as_slice()).unwrap_or_default() {
            let resolved = target.destination.resolve(job_dir);
            let candidate = match target.destination {
                Destination::Directory(_) => resolved.join(requested),
                Destination::File(_) if resolved.file_name() == Some(requested.as_os_str()) => resolved,
                Destination::File(_) => continue,
            };
            if candidate.is_file() {
                debug!("Found {} in {}", requested.display(), target.destination);
                return Ok(candidate);
            }
        }
    }

    Err(BackupError::NotFound(requested.to_path_buf()).into())
}

/// Encryption settings recorded in the archive's sidecar, if it has one.
fn sidecar_encryption(archive: &Path, name: &str) -> Option<EncryptionSettings> {
    let sidecar = archive.with_file_name(sidecar_name(name));
    match store::load(&sidecar) {
        Ok(configuration) => configuration.encryption,
        Err(e) => {
            debug!("No usable sidecar at {}: {}", sidecar.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sandbox;
    use crate::error::{exit_code, EXIT_NOT_FOUND};
    use dirsnap_core::archive::{ArchiveBuilder, ArchiveOptions};
    use dirsnap_core::BackupTarget;

    fn backups_with_archive(root: &Path, job_dir: &Path) -> (PathBuf, String) {
        let dest = root.join("backups");
        fs::create_dir_all(&dest).unwrap();
        let name = "job-20240601-120000.tar.gz".to_string();
        let patterns: [&str; 0] = [];
        ArchiveBuilder::new(ArchiveOptions::default())
            .build(job_dir, &dest.join(&name), &patterns)
            .unwrap();
        (dest, name)
    }

    #[test]
    fn test_bare_name_found_in_directory_target() {
        let sb = sandbox();
        let (dest, name) = backups_with_archive(sb.root.path(), &sb.ctx.job_dir);
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(&dest));

        let found = locate_archive(&sb.ctx.job_dir, Some(&cfg), Path::new(&name)).unwrap();
        assert_eq!(found, dest.join(&name));
    }

    #[test]
    fn test_unknown_archive_is_not_found() {
        let sb = sandbox();
        let err = locate_archive(
            &sb.ctx.job_dir,
            Some(&BackupConfiguration::default()),
            Path::new("nothing-20240101-000000.tar.gz"),
        )
        .unwrap_err();
        assert_eq!(exit_code(&err), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_restore_into_directory() {
        let sb = sandbox();
        let (dest, name) = backups_with_archive(sb.root.path(), &sb.ctx.job_dir);
        let mut cfg = BackupConfiguration::default();
        cfg.add_target(BackupTarget::directory(&dest));
        sb.ctx.save_configuration(&cfg).unwrap();
        let to = sb.path("restored");

        run(
            &sb.ctx,
            RestoreArgs {
                archive: PathBuf::from(&name),
                to: Some(to.clone()),
                overwrite: false,
                passphrase: None,
            },
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(to.join("src/main.rs")).unwrap(),
            "fn main() {}"
        );
    }
}

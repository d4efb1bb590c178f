//! `dirsnap init`: starter job configuration.

use crate::cli::InitArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;
use dirsnap_core::store::{read_registry, ConfigDocument, GlobalRegistry};
use dirsnap_core::{BackupConfiguration, BackupTarget, Destination, Settings};
use std::fs;
use std::path::Path;
use tracing::info;

/// Used when no registry template covers the job directory.
pub const DEFAULT_LOCAL_TARGET: &str = ".backups/location1";

pub fn run(ctx: &Context, args: InitArgs) -> anyhow::Result<()> {
    let path = ctx.config_path();
    if path.exists() && !args.overwrite {
        return Err(CliError::Usage(format!(
            "{} already exists (use --overwrite to replace it)",
            path.display()
        ))
        .into());
    }

    let registry = match &ctx.settings.registry_path {
        Some(registry_path) => read_registry(registry_path)?,
        None => None,
    };
    let configuration = starter_configuration(&ctx.settings, &ctx.job_dir, registry.as_ref());

    for target in &configuration.targets {
        if let Destination::Directory(_) = target.destination {
            let dir = target.destination.resolve(&ctx.job_dir);
            if dir.starts_with(&ctx.job_dir) {
                fs::create_dir_all(&dir)?;
            }
        }
    }

    ctx.save_configuration(&configuration)?;
    info!("Created {}", path.display());

    if ctx.json {
        return output::json(&ConfigDocument::from(&configuration));
    }

    output::success(&format!("Created {}", path.display()));
    for target in &configuration.targets {
        output::kv(target.destination.kind(), &target.destination.path().display().to_string());
    }
    if let Some(encryption) = &configuration.encryption {
        output::kv("encryption", &format!("{} for {}", encryption.method, encryption.receiver));
    }
    Ok(())
}

/// Default excludes, registry-derived targets (or a local fallback) and the
/// registry's default encryption.
pub fn starter_configuration(
    settings: &Settings,
    job_dir: &Path,
    registry: Option<&GlobalRegistry>,
) -> BackupConfiguration {
    let mut configuration = BackupConfiguration {
        excludes: settings.default_excludes.clone(),
        ..BackupConfiguration::default()
    };

    if let Some(registry) = registry {
        for target in registry.template_targets(job_dir) {
            configuration.add_target(target);
        }
        configuration.encryption = registry.default.encryption.clone();
    }

    if configuration.targets.is_empty() {
        configuration.add_target(BackupTarget::directory(DEFAULT_LOCAL_TARGET));
    }
    configuration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sandbox;
    use dirsnap_core::store;

    #[test]
    fn test_init_without_registry_uses_local_target() {
        let sb = sandbox();

        run(&sb.ctx, InitArgs { overwrite: false }).unwrap();

        let cfg = store::load(&sb.ctx.config_path()).unwrap();
        assert_eq!(cfg.excludes, vec![".git", "node_modules", "bin"]);
        assert_eq!(
            cfg.targets[0].destination,
            Destination::Directory(DEFAULT_LOCAL_TARGET.into())
        );
        assert!(cfg.encryption.is_none());
        assert!(sb.ctx.job_dir.join(DEFAULT_LOCAL_TARGET).is_dir());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let sb = sandbox();
        run(&sb.ctx, InitArgs { overwrite: false }).unwrap();

        let err = run(&sb.ctx, InitArgs { overwrite: false }).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));

        run(&sb.ctx, InitArgs { overwrite: true }).unwrap();
    }

    #[test]
    fn test_registry_templates_and_encryption() {
        let sb = sandbox();
        let registry_path = sb.ctx.settings.registry_path.clone().unwrap();
        fs::create_dir_all(registry_path.parent().unwrap()).unwrap();
        fs::write(
            &registry_path,
            format!(
                "default:\n  encryption:\n    method: gpg\n    receiver: me@example.com\n  target:\n    - base: {}\n      targets: [/mnt/a, /mnt/b]\n",
                sb.path("projects").display()
            ),
        )
        .unwrap();

        run(&sb.ctx, InitArgs { overwrite: false }).unwrap();

        let cfg = store::load(&sb.ctx.config_path()).unwrap();
        let dests: Vec<_> = cfg.targets.iter().map(|t| t.destination.clone()).collect();
        assert_eq!(
            dests,
            vec![
                Destination::Directory("/mnt/a".into()),
                Destination::Directory("/mnt/b".into()),
            ]
        );
        assert_eq!(cfg.encryption.unwrap().receiver, "me@example.com");
    }
}

//! `dirsnap target add|remove`

use crate::cli::TargetCommands;
use crate::context::Context;
use crate::error::CliError;
use crate::output;
use dirsnap_core::{BackupConfiguration, BackupTarget, Destination};
use std::path::Path;

pub fn run(ctx: &Context, command: TargetCommands) -> anyhow::Result<()> {
    let mut configuration = ctx.load_configuration()?;

    match command {
        TargetCommands::Add {
            path,
            file,
            max_backups,
        } => {
            if file && max_backups.is_some() {
                output::warning("--max-backups is ignored for file targets");
            }
            let target = build_target(&path, file, max_backups);
            let destination = target.destination.clone();
            if !configuration.add_target(target) {
                return Err(CliError::Usage(format!("{} is already a target", destination)).into());
            }
            ctx.save_configuration(&configuration)?;
            output::success(&format!("Added {} target {}", destination.kind(), destination));
        }
        TargetCommands::Remove { path } => {
            let destination = find_destination(&configuration, &path)
                .ok_or_else(|| CliError::Usage(format!("{} is not a target", path.display())))?;
            configuration.remove_target(&destination);
            ctx.save_configuration(&configuration)?;
            output::success(&format!("Removed target {}", destination));
        }
    }
    Ok(())
}

fn build_target(path: &Path, file: bool, max_backups: Option<usize>) -> BackupTarget {
    if file {
        return BackupTarget::file(path);
    }
    let target = BackupTarget::directory(path);
    match max_backups {
        Some(max) => target.with_max_backups(max),
        None => target,
    }
}

/// Matches a configured destination by path, whatever its kind.
fn find_destination(configuration: &BackupConfiguration, path: &Path) -> Option<Destination> {
    configuration
        .targets
        .iter()
        .map(|t| &t.destination)
        .find(|d| d.path() == path)
        .cloned()
}

//! `dirsnap list`: archives present in backup locations.

use crate::cli::ListArgs;
use crate::context::Context;
use crate::output;
use dirsnap_core::archive::archive_prefix;
use dirsnap_core::retention::{catalog, ArchiveEntry};
use dirsnap_core::transfer::format_bytes;
use dirsnap_core::Destination;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Serialize)]
struct Location {
    path: PathBuf,
    archives: Vec<ArchiveEntry>,
}

pub fn run(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let filter = if args.all {
        None
    } else {
        Some(archive_prefix(&ctx.job_dir))
    };

    let locations = match args.location {
        Some(location) => vec![location],
        None => ctx
            .load_configuration()?
            .targets
            .iter()
            .filter(|t| matches!(t.destination, Destination::Directory(_)))
            .map(|t| t.destination.resolve(&ctx.job_dir))
            .collect(),
    };

    let mut listing = Vec::with_capacity(locations.len());
    for path in locations {
        let archives = if path.is_dir() {
            catalog(&path, filter.as_deref())?
        } else {
            warn!("{} is not a directory", path.display());
            Vec::new()
        };
        listing.push(Location { path, archives });
    }

    if ctx.json {
        return output::json(&listing);
    }

    for location in &listing {
        output::header(&location.path.display().to_string());
        if location.archives.is_empty() {
            output::dim("no archives");
            continue;
        }
        for archive in &location.archives {
            let mut flags = Vec::new();
            if archive.encrypted {
                flags.push("encrypted");
            }
            if !archive.has_sidecar {
                flags.push("no metadata");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            };
            println!(
                "  {}  {:>10}  {}{}",
                archive.created.format("%Y-%m-%d %H:%M:%S"),
                format_bytes(archive.bytes),
                archive.name,
                flags
            );
        }
    }
    Ok(())
}

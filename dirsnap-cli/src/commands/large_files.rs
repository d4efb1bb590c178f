//! `dirsnap large-files`

use crate::cli::{LargeFilesArgs, SortKey};
use crate::context::Context;
use crate::output;
use dirsnap_core::fs::size::MB;
use dirsnap_core::fs::{list_large, LargeFile};
use dirsnap_core::transfer::format_bytes;

pub fn run(ctx: &Context, args: LargeFilesArgs) -> anyhow::Result<()> {
    let root = args.path.clone().unwrap_or_else(|| ctx.job_dir.clone());
    let threshold = args.min_size.saturating_mul(MB);

    let mut files = list_large(&root, &args.excludes, threshold)?;
    let found = files.len();
    let total: u64 = files.iter().map(|f| f.bytes).sum();
    sort_files(&mut files, args.sort);
    if args.limit > 0 {
        files.truncate(args.limit);
    }

    if ctx.json {
        return output::json(&files);
    }

    if files.is_empty() {
        output::info(&format!(
            "No files larger than {} under {}",
            format_bytes(threshold),
            root.display()
        ));
        return Ok(());
    }

    output::header(&format!(
        "{} file(s) larger than {} ({} total)",
        found,
        format_bytes(threshold),
        format_bytes(total)
    ));
    for file in &files {
        println!(
            "  {:>10}  {}  {}",
            format_bytes(file.bytes),
            file.modified.format("%Y-%m-%d"),
            file.relative_path.display()
        );
    }
    if files.len() < found {
        output::dim(&format!("... {} more (raise --limit to see them)", found - files.len()));
    }
    Ok(())
}

/// Size and date sort newest/largest first; name sorts ascending.
pub fn sort_files(files: &mut [LargeFile], key: SortKey) {
    match key {
        SortKey::Size => files.sort_by(|a, b| {
            b.bytes
                .cmp(&a.bytes)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        }),
        SortKey::Name => files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path)),
        SortKey::Date => files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        }),
    }
}

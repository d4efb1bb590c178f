//! Metadata file written next to every archive copy.
//!
//! The sidecar is the job configuration as it stood right after the copy,
//! preceded by comment lines telling whoever finds the archive how to get
//! the data back out. It is valid job YAML, so `restore` can read it.

use crate::models::BackupConfiguration;
use crate::store::ConfigDocument;
use crate::Result;
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::path::Path;

pub struct SidecarContext<'a> {
    pub archive_name: &'a str,
    pub source: &'a Path,
    pub created_at: DateTime<Utc>,
    /// Recipient the archive was encrypted for
    pub recipient: Option<&'a str>,
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn render(context: &SidecarContext<'_>, configuration: &BackupConfiguration) -> Result<String> {
    let mut snapshot = ConfigDocument::from(configuration);
    if let Some(encryption) = snapshot.encryption.as_mut() {
        encryption.passphrase = None;
    }

    let plain = context
        .archive_name
        .strip_suffix(crate::archive::naming::ENCRYPTED_SUFFIX)
        .unwrap_or(context.archive_name);

    let mut lines = vec![
        "dirsnap backup metadata".to_string(),
        format!("Archive: {}", context.archive_name),
        format!("Source:  {}", context.source.display()),
        format!("Host:    {}", host_name()),
        format!(
            "Created: {}",
            context.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        String::new(),
        "To restore:".to_string(),
        format!("  dirsnap restore {} --to <directory>", context.archive_name),
        "or by hand:".to_string(),
    ];
    if let Some(recipient) = context.recipient {
        lines.push(format!("  (encrypted for {})", recipient));
        lines.push(format!("  gpg --output {} --decrypt {}", plain, context.archive_name));
    }
    lines.push(format!("  mkdir -p <directory> && tar -xzf {} -C <directory>", plain));

    let mut out: String = lines
        .iter()
        .map(|line| if line.is_empty() { "#\n".to_string() } else { format!("# {}\n", line) })
        .collect();
    out.push_str(&serde_yaml::to_string(&snapshot)?);

    Ok(out)
}

pub fn write(path: &Path, context: &SidecarContext<'_>, configuration: &BackupConfiguration) -> Result<()> {
    fs::write(path, render(context, configuration)?)?;
    Ok(())
}

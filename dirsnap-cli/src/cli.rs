//! CLI argument parsing with clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dirsnap - point-in-time directory snapshots with rotation
#[derive(Parser, Debug)]
#[command(name = "dirsnap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Job directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Settings file (defaults to the per-user settings.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive the job directory and copy it to every target
    Run(RunArgs),

    /// Run every job recorded in the global registry
    RunAll(RunAllArgs),

    /// Create a starter job configuration
    Init(InitArgs),

    /// Show per-target backup status
    Status,

    /// List archives in a backup location
    List(ListArgs),

    /// Report the largest files in a directory
    LargeFiles(LargeFilesArgs),

    /// Unpack an archive, decrypting it first when needed
    Restore(RestoreArgs),

    /// Add or remove backup targets
    #[command(subcommand)]
    Target(TargetCommands),

    /// Turn archive encryption on or off
    #[command(subcommand)]
    Encryption(EncryptionCommands),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Job configuration file, relative to the job directory
    #[arg(short = 'f', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Skip the confirmation when oversized files are found
    #[arg(long)]
    pub force: bool,

    /// Extra exclusion pattern (repeatable)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,

    /// Encrypt for this recipient instead of the configured one
    #[arg(long, value_name = "RECIPIENT", conflicts_with = "no_encrypt")]
    pub encrypt_to: Option<String>,

    /// Do not encrypt even if the configuration asks for it
    #[arg(long)]
    pub no_encrypt: bool,

    /// Do not write a metadata file next to each archive
    #[arg(long)]
    pub no_sidecar: bool,
}

#[derive(Args, Debug)]
pub struct RunAllArgs {
    /// Keep going after a job fails
    #[arg(long = "continue")]
    pub keep_going: bool,

    /// Do not stop jobs that contain oversized files
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Replace an existing configuration
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Location to scan (defaults to the job's directory targets)
    pub location: Option<PathBuf>,

    /// Show archives of every source, not just this job
    #[arg(short, long)]
    pub all: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Size,
    Name,
    Date,
}

#[derive(Args, Debug)]
pub struct LargeFilesArgs {
    /// Directory to scan (defaults to the job directory)
    pub path: Option<PathBuf>,

    /// Minimum size in MB
    #[arg(short, long, default_value_t = 100)]
    pub min_size: u64,

    /// Sort order
    #[arg(short, long, value_enum, default_value_t = SortKey::Size)]
    pub sort: SortKey,

    /// Maximum number of files to show (0 for all)
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,

    /// Extra exclusion pattern (repeatable)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Archive file, or the name of an archive in one of the job's targets
    pub archive: PathBuf,

    /// Directory to unpack into
    #[arg(short, long, value_name = "DIR")]
    pub to: Option<PathBuf>,

    /// Replace files that already exist in the target directory
    #[arg(long)]
    pub overwrite: bool,

    /// Passphrase for the decryption key
    #[arg(long, env = "DIRSNAP_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum TargetCommands {
    /// Add a destination
    Add {
        /// Destination directory, or archive file with --file
        path: PathBuf,

        /// Treat the path as a single file that is overwritten on each run
        #[arg(long)]
        file: bool,

        /// Archives to keep in a directory destination
        #[arg(short, long)]
        max_backups: Option<usize>,
    },

    /// Remove a destination
    Remove {
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum EncryptionCommands {
    /// Encrypt archives for a recipient
    Enable {
        /// Key recipient (e-mail or key id)
        recipient: String,

        #[arg(long, default_value = "gpg")]
        method: String,
    },

    /// Stop encrypting archives
    Disable,
}

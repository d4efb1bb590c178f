//! Tool settings.
//!
//! Built-in defaults, then an optional TOML file, then `DIRSNAP_*`
//! environment variables. Job configurations (`.backup.yaml`) are a separate
//! document handled by [`crate::store`].

use crate::fs::size::RECOMMENDED_MAX_FILE_SIZE;
use crate::store::{registry::REGISTRY_FILE_NAME, CONFIG_FILE_NAME};
use crate::{BackupError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "DIRSNAP";
pub const SETTINGS_DIR: &str = "dirsnap";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Excludes applied when a job has none of its own.
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", "node_modules", "bin"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Where temporary archives are assembled
    pub scratch_dir: PathBuf,

    /// Global registry; `None` when no home directory is known
    pub registry_path: Option<PathBuf>,

    /// Job configuration file name inside a job directory
    pub config_file_name: String,

    /// Gzip level (1-9)
    pub compression_level: u32,

    /// Files above this size trigger the pre-flight warning
    pub large_file_threshold: u64,

    pub default_excludes: Vec<String>,
}

impl Settings {
    /// Job configuration path for `job_dir`.
    pub fn config_path(&self, job_dir: &Path) -> PathBuf {
        job_dir.join(&self.config_file_name)
    }
}

/// Assembles [`Settings`] from its layered sources.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this settings file instead of the per-user default. It must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the process environment (tests).
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn default_file() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR).join(SETTINGS_FILE_NAME))
    }

    pub fn load(&self) -> Result<Settings> {
        let mut builder = Config::builder()
            .set_default("log_level", "info")?
            .set_default("scratch_dir", std::env::temp_dir().to_string_lossy().into_owned())?
            .set_default("config_file_name", CONFIG_FILE_NAME)?
            .set_default("compression_level", 6i64)?
            .set_default("large_file_threshold", RECOMMENDED_MAX_FILE_SIZE as i64)?
            .set_default("default_excludes", DEFAULT_EXCLUDES.to_vec())?;

        if let Some(home) = dirs::home_dir() {
            builder = builder.set_default(
                "registry_path",
                home.join(REGISTRY_FILE_NAME).to_string_lossy().into_owned(),
            )?;
        }

        match &self.file {
            Some(path) => {
                if !path.exists() {
                    return Err(BackupError::NotFound(path.clone()));
                }
                debug!("Loading settings from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = Self::default_file() {
                    builder = builder.add_source(
                        File::from(path.as_path())
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("default_excludes")
                .source(self.env.clone()),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.compression_level = settings.compression_level.clamp(1, 9);
        Ok(settings)
    }
}

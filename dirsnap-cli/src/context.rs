//! State shared by every subcommand.

use anyhow::Context as _;
use chrono::Utc;
use dirsnap_core::store;
use dirsnap_core::{BackupConfiguration, Settings};
use std::path::{Path, PathBuf};

pub struct Context {
    pub settings: Settings,
    /// Absolute job directory
    pub job_dir: PathBuf,
    pub json: bool,
}

impl Context {
    pub fn new(settings: Settings, dir: Option<&Path>, json: bool) -> anyhow::Result<Self> {
        let job_dir = match dir {
            Some(dir) => std::path::absolute(dir)
                .with_context(|| format!("cannot resolve {}", dir.display()))?,
            None => std::env::current_dir().context("cannot read the current directory")?,
        };

        Ok(Self {
            settings,
            job_dir,
            json,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.settings.config_path(&self.job_dir)
    }

    pub fn load_configuration(&self) -> anyhow::Result<BackupConfiguration> {
        let path = self.config_path();
        store::load(&path).with_context(|| {
            format!(
                "cannot load {} (run `dirsnap init` to create one)",
                path.display()
            )
        })
    }

    pub fn save_configuration(&self, configuration: &BackupConfiguration) -> anyhow::Result<()> {
        let path = self.config_path();
        store::save(&path, configuration, Utc::now())
            .with_context(|| format!("cannot write {}", path.display()))
    }
}

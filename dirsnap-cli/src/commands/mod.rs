//! One module per subcommand

pub mod encryption;
pub mod init;
pub mod large_files;
pub mod list;
pub mod restore;
pub mod run;
pub mod run_all;
pub mod status;
pub mod target;

#[cfg(test)]
pub(crate) mod testing {
    use crate::context::Context;
    use dirsnap_core::config::DEFAULT_EXCLUDES;
    use dirsnap_core::fs::RECOMMENDED_MAX_FILE_SIZE;
    use dirsnap_core::Settings;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub struct Sandbox {
        pub root: TempDir,
        pub ctx: Context,
    }

    impl Sandbox {
        pub fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }
    }

    /// A job directory with isolated scratch and registry paths.
    pub fn sandbox() -> Sandbox {
        let root = TempDir::new().unwrap();
        let job_dir = root.path().join("projects/job");
        fs::create_dir_all(job_dir.join("src")).unwrap();
        fs::write(job_dir.join("src/main.rs"), "fn main() {}").unwrap();

        let settings = Settings {
            log_level: "warn".into(),
            scratch_dir: root.path().join("scratch"),
            registry_path: Some(root.path().join("home/.backup.yaml")),
            config_file_name: ".backup.yaml".into(),
            compression_level: 1,
            large_file_threshold: RECOMMENDED_MAX_FILE_SIZE,
            default_excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        };

        let ctx = Context {
            settings,
            job_dir,
            json: true,
        };
        Sandbox { root, ctx }
    }
}

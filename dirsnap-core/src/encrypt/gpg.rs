//! GnuPG backend. Shells out to the `gpg` binary.

use super::Encryptor;
use crate::archive::naming::encrypted_name;
use crate::{BackupError, Result};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

pub const METHOD: &str = "gpg";

#[derive(Debug, Clone)]
pub struct GpgEncryptor {
    program: PathBuf,
}

impl Default for GpgEncryptor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
        }
    }
}

impl GpgEncryptor {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[OsString], stdin: Option<&str>) -> Result<Output> {
        debug!("Running {} {:?}", self.program.display(), args);

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        // The pipe is dropped at the end of the match so the child sees EOF.
        let written = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => pipe
                .write_all(input.as_bytes())
                .and_then(|()| pipe.write_all(b"\n")),
            _ => Ok(()),
        };

        let output = child.wait_with_output()?;
        if let Err(e) = written {
            return Err(BackupError::Encryption(format!(
                "failed to pass input to {}: {} {}",
                self.program.display(),
                e,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    fn spawn_error(&self, err: io::Error) -> BackupError {
        if err.kind() == io::ErrorKind::NotFound {
            BackupError::Encryption(format!(
                "{} not found; install GnuPG or disable encryption",
                self.program.display()
            ))
        } else {
            BackupError::Encryption(format!("failed to start {}: {}", self.program.display(), err))
        }
    }
}

fn failure(action: &str, output: &Output) -> BackupError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    BackupError::Encryption(format!("{} failed: {}", action, stderr.trim()))
}

pub(crate) fn encrypt_args(input: &Path, output: &Path, recipient: &str) -> Vec<OsString> {
    vec![
        "--batch".into(),
        "--yes".into(),
        "--trust-model".into(),
        "always".into(),
        "--recipient".into(),
        recipient.into(),
        "--output".into(),
        output.into(),
        "--encrypt".into(),
        input.into(),
    ]
}

pub(crate) fn decrypt_args(input: &Path, output: &Path, with_passphrase: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--batch".into(), "--yes".into()];
    if with_passphrase {
        args.extend(["--pinentry-mode".into(), "loopback".into(), "--passphrase-fd".into(), "0".into()]);
    }
    args.extend(["--output".into(), output.into(), "--decrypt".into(), input.into()]);
    args
}

impl Encryptor for GpgEncryptor {
    fn method(&self) -> &str {
        METHOD
    }

    fn encrypt(&self, path: &Path, recipient: &str) -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .map(|n| encrypted_name(&n.to_string_lossy()))
            .ok_or_else(|| BackupError::Encryption(format!("not a file: {}", path.display())))?;
        let output_path = path.with_file_name(file_name);

        info!("Encrypting {} for {}", path.display(), recipient);
        let output = self.run(&encrypt_args(path, &output_path, recipient), None)?;
        if !output.status.success() {
            return Err(failure("gpg encryption", &output));
        }

        Ok(output_path)
    }

    fn decrypt(&self, path: &Path, output: &Path, passphrase: Option<&str>) -> Result<PathBuf> {
        info!("Decrypting {}", path.display());
        let result = self.run(&decrypt_args(path, output, passphrase.is_some()), passphrase)?;
        if !result.status.success() {
            return Err(failure("gpg decryption", &result));
        }

        Ok(output.to_path_buf())
    }

    fn describe_recipient(&self, recipient: &str) -> Result<Option<String>> {
        let args: [OsString; 2] = ["--list-keys".into(), recipient.into()];
        let output = self.run(&args, None)?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()));
        }

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if combined.contains("No public key") {
            Ok(None)
        } else {
            Err(failure("gpg key lookup", &output))
        }
    }
}

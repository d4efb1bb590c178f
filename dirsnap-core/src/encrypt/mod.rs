//! Archive encryption as an opaque file-to-file transform.

pub mod gpg;

pub use gpg::GpgEncryptor;

use crate::{BackupError, Result};
use std::path::{Path, PathBuf};

/// A public-key encryption backend.
pub trait Encryptor {
    /// Value stored in the configuration's `method` field.
    fn method(&self) -> &str;

    /// Encrypts `path` for `recipient`, returning the path of the new file.
    /// The plain input is left in place.
    fn encrypt(&self, path: &Path, recipient: &str) -> Result<PathBuf>;

    /// Decrypts `path` into `output`.
    fn decrypt(&self, path: &Path, output: &Path, passphrase: Option<&str>) -> Result<PathBuf>;

    /// Key description for a known recipient, `None` when the keyring has no
    /// public key for it.
    fn describe_recipient(&self, recipient: &str) -> Result<Option<String>>;
}

/// Backend for a configured method name.
pub fn encryptor_for(method: &str) -> Result<Box<dyn Encryptor>> {
    match method.trim().to_ascii_lowercase().as_str() {
        gpg::METHOD => Ok(Box::new(GpgEncryptor::default())),
        other => Err(BackupError::Validation(format!(
            "unsupported encryption method '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_methods() {
        assert_eq!(encryptor_for("GPG").unwrap().method(), "gpg");
        assert!(matches!(
            encryptor_for("age"),
            Err(BackupError::Validation(_))
        ));
    }
}

//! The per-job configuration document and its mutations.

use super::target::{BackupRecord, BackupTarget, Destination, RunOutcome, RunStatus};
use crate::encrypt::Encryptor;
use crate::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Encryption applied to archives before they are copied to destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    pub method: String,
    /// Key recipient (e-mail or key id)
    pub receiver: String,
    /// Only consulted by restore. Keeping a passphrase in a plain-text file
    /// is insecure, so the tool never writes one itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupConfiguration {
    pub excludes: Vec<String>,
    pub targets: Vec<BackupTarget>,
    pub encryption: Option<EncryptionSettings>,
}

impl BackupConfiguration {
    pub fn find_target(&self, destination: &Destination) -> Option<&BackupTarget> {
        self.targets.iter().find(|t| &t.destination == destination)
    }

    fn find_target_mut(&mut self, destination: &Destination) -> Option<&mut BackupTarget> {
        self.targets.iter_mut().find(|t| &t.destination == destination)
    }

    /// Rejects configurations where two targets share a destination path.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.destination.path()) {
                return Err(BackupError::Validation(format!(
                    "destination {} is configured more than once",
                    target.destination
                )));
            }
        }
        Ok(())
    }

    /// Returns false when a target with the same destination path exists.
    pub fn add_target(&mut self, target: BackupTarget) -> bool {
        let path = target.destination.path();
        if self.targets.iter().any(|t| t.destination.path() == path) {
            return false;
        }
        self.targets.push(target);
        true
    }

    /// Removes the target with the same destination path, whatever its kind.
    pub fn remove_target(&mut self, destination: &Destination) -> bool {
        let before = self.targets.len();
        let path = destination.path();
        self.targets.retain(|t| t.destination.path() != path);
        self.targets.len() != before
    }

    /// Records a completed copy. Returns false when no such target exists.
    pub fn append_record(&mut self, destination: &Destination, record: BackupRecord) -> bool {
        match self.find_target_mut(destination) {
            Some(target) => {
                target.push_record(record);
                true
            }
            None => false,
        }
    }

    pub fn set_run_status(
        &mut self,
        destination: &Destination,
        status: RunOutcome,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> bool {
        match self.find_target_mut(destination) {
            Some(target) => {
                target.last_run = Some(RunStatus {
                    timestamp: at,
                    status,
                    message: message.into(),
                });
                true
            }
            None => false,
        }
    }

    /// Turns on encryption for `recipient` after checking the key exists.
    /// Returns the key description reported by the backend.
    pub fn set_encryption(&mut self, encryptor: &dyn Encryptor, recipient: &str) -> Result<String> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(BackupError::Validation(
                "an encryption recipient must be specified".into(),
            ));
        }

        let key_info = encryptor.describe_recipient(recipient)?.ok_or_else(|| {
            BackupError::Validation(format!(
                "invalid recipient '{}': no public key in the keyring",
                recipient
            ))
        })?;

        let passphrase = self.encryption.take().and_then(|e| e.passphrase);
        self.encryption = Some(EncryptionSettings {
            method: encryptor.method().to_string(),
            receiver: recipient.to_string(),
            passphrase,
        });

        info!("Encryption enabled for {}", recipient);
        Ok(key_info)
    }

    /// Returns false when encryption was already off.
    pub fn clear_encryption(&mut self) -> bool {
        self.encryption.take().is_some()
    }
}

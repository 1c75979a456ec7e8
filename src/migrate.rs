//! Moving a key store between plaintext and password-protected storage.
//!
//! Both directions back up the prior record before touching anything, so a
//! successful migration always leaves the previous form in `backups/`.

use std::path::PathBuf;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::error::{GitCascadeError, Result};
use crate::keystore::{KeyStore, KeyStoreStatus, StorageMode};

/// Where a migration put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Backup of the record that was replaced
    pub backup: PathBuf,
    /// The new active record
    pub active: PathBuf,
}

pub struct KeyMigrator<'a> {
    store: &'a KeyStore,
}

impl<'a> KeyMigrator<'a> {
    pub fn new(store: &'a KeyStore) -> Self {
        Self { store }
    }

    /// Wrap the plaintext keypair under `password`.
    pub fn to_password_protected(&self, password: &SecretString) -> Result<MigrationReport> {
        let _lock = self.store.lock()?;
        match self.store.status()? {
            KeyStoreStatus::Uninitialized => return Err(GitCascadeError::NoPlaintextKey),
            KeyStoreStatus::PasswordProtected => return Err(GitCascadeError::AlreadyProtected),
            KeyStoreStatus::Plaintext => {}
        }

        let keypair = self.store.load_record(&self.store.plaintext_path(), None)?;
        let backup = self.store.backup_active()?;

        let active = self
            .store
            .write_record(&keypair, StorageMode::PasswordProtected, Some(password))?;

        // The plaintext copy goes only once the new record opens to the same key
        match self.store.load_record(&active, Some(password)) {
            Ok(reloaded) if reloaded == keypair => {}
            Ok(_) | Err(_) => {
                warn!("protected record failed verification, keeping plaintext key");
                self.store.remove_record(StorageMode::PasswordProtected)?;
                return Err(GitCascadeError::Other(
                    "protected key record failed verification".into(),
                ));
            }
        }

        self.store.remove_record(StorageMode::Plaintext)?;
        info!(backup = %backup.display(), "migrated key to password-protected storage");
        Ok(MigrationReport { backup, active })
    }

    /// Unwrap the protected keypair back to a plaintext record.
    pub fn to_plaintext(&self, password: &SecretString) -> Result<MigrationReport> {
        let _lock = self.store.lock()?;
        match self.store.status()? {
            KeyStoreStatus::Uninitialized => return Err(GitCascadeError::NoEncryptedKey),
            KeyStoreStatus::Plaintext => return Err(GitCascadeError::AlreadyPlaintext),
            KeyStoreStatus::PasswordProtected => {}
        }

        let keypair = self
            .store
            .load_record(&self.store.protected_path(), Some(password))?;
        let backup = self.store.backup_active()?;

        let active = self
            .store
            .write_record(&keypair, StorageMode::Plaintext, None)?;
        self.store.remove_record(StorageMode::PasswordProtected)?;

        info!(backup = %backup.display(), "migrated key to plaintext storage");
        Ok(MigrationReport { backup, active })
    }
}

//! Keypair rotation.
//!
//! A rotation swaps the active keypair, then pushes every encrypted file
//! back through the cascade under the new master key. The key swap is
//! atomic; file conversion runs in batches and may stop part way. Blobs
//! carry their key id in the envelope header, so [`Rekeyer::resume`] can
//! pick up an interrupted run by skipping what is already converted.
//!
//! Old keypairs are never destroyed: the prior record is always copied to
//! `backups/` first, and anything written before the rotation still opens
//! with it.

use std::collections::HashSet;
use std::path::PathBuf;

use rayon::prelude::*;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::cascade::CascadeCipher;
use crate::envelope;
use crate::error::{GitCascadeError, Result};
use crate::kdf::KeyId;
use crate::keypair;
use crate::keystore::KeyStore;

/// A set of encrypted files whose stored form can be rewritten.
///
/// [`crate::git::IndexTarget`] implements this over the git index.
pub trait RekeyTarget {
    /// Paths routed through the encryption filter.
    fn encrypted_paths(&self) -> Result<Vec<String>>;

    /// Encrypted paths with staged, uncommitted changes.
    fn pending_changes(&self) -> Result<Vec<String>>;

    /// The stored (clean) form of `path`.
    fn read_stored(&self, path: &str) -> Result<Vec<u8>>;

    /// Replace the stored form of `path`. Takes effect on [`RekeyTarget::flush`].
    fn stage(&mut self, path: &str, content: Vec<u8>) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotateOptions {
    /// Rotate even when encrypted files have staged changes
    pub force: bool,
    /// Files per read/convert/stage/flush round
    pub batch_size: usize,
    /// Worker threads for conversion (0 = rayon default)
    pub jobs: usize,
}

impl Default for RotateOptions {
    fn default() -> Self {
        Self {
            force: false,
            batch_size: 64,
            jobs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// Backup of the retired record (newest usable backup on resume)
    pub backup: Option<PathBuf>,
    pub old_key_id: Option<KeyId>,
    pub new_key_id: KeyId,
    /// Files re-encrypted under the new key
    pub rewritten: usize,
    /// Files already under the new key
    pub skipped: usize,
}

pub struct Rekeyer<'a> {
    store: &'a KeyStore,
    options: RotateOptions,
}

impl<'a> Rekeyer<'a> {
    pub fn new(store: &'a KeyStore, options: RotateOptions) -> Self {
        Self { store, options }
    }

    /// Rotate to a fresh keypair and re-encrypt every file in `target`.
    ///
    /// Holds the key store writer lock from reading the old keypair until
    /// the last batch is flushed, so no other writer can swap the record
    /// underneath the conversion.
    pub fn rotate<T: RekeyTarget>(
        &self,
        target: &mut T,
        password: Option<&SecretString>,
    ) -> Result<RotationReport> {
        if !self.store.is_initialized() {
            return Err(GitCascadeError::NotInitialized);
        }
        let _lock = self.store.lock()?;

        let mode = self.store.mode()?.ok_or(GitCascadeError::NotInitialized)?;
        let old = self.store.load(password)?;

        if !self.options.force {
            let pending = target.pending_changes()?;
            if !pending.is_empty() {
                return Err(GitCascadeError::PendingChanges(pending));
            }
        }

        let old_cipher = CascadeCipher::from_keypair(&old)?;
        let new = keypair::generate()?;
        let new_cipher = CascadeCipher::from_keypair(&new)?;

        let backup = self.store.backup_active()?;
        self.store.write_record(&new, mode, password)?;
        info!(
            old = %old_cipher.key_id(),
            new = %new_cipher.key_id(),
            backup = %backup.display(),
            "rotated active keypair"
        );

        let old_key_id = old_cipher.key_id();
        let (rewritten, skipped) = self.convert_all(target, &new_cipher, &[old_cipher])?;

        Ok(RotationReport {
            backup: Some(backup),
            old_key_id: Some(old_key_id),
            new_key_id: new_cipher.key_id(),
            rewritten,
            skipped,
        })
    }

    /// Finish an interrupted rotation.
    ///
    /// The active keypair is the target key; every backup that loads with
    /// `password` (or without one, for plaintext backups) is tried as an
    /// old key. Safe to run repeatedly.
    pub fn resume<T: RekeyTarget>(
        &self,
        target: &mut T,
        password: Option<&SecretString>,
    ) -> Result<RotationReport> {
        if !self.store.is_initialized() {
            return Err(GitCascadeError::NotInitialized);
        }
        let _lock = self.store.lock()?;

        let active = self.store.load(password)?;
        let new_cipher = CascadeCipher::from_keypair(&active)?;

        let mut seen = HashSet::from([new_cipher.key_id()]);
        let mut old_ciphers = Vec::new();
        let mut newest = None;
        for path in self.store.backups()? {
            let cipher = match self
                .store
                .load_record(&path, password)
                .and_then(|kp| CascadeCipher::from_keypair(&kp))
            {
                Ok(cipher) => cipher,
                Err(e) => {
                    warn!(backup = %path.display(), error = %e, "skipping unreadable backup");
                    continue;
                }
            };
            if seen.insert(cipher.key_id()) {
                if newest.is_none() {
                    newest = Some((path, cipher.key_id()));
                }
                old_ciphers.push(cipher);
            }
        }

        let (rewritten, skipped) = self.convert_all(target, &new_cipher, &old_ciphers)?;
        info!(rewritten, skipped, "resumed rotation");

        let (backup, old_key_id) = newest.unzip();
        Ok(RotationReport {
            backup,
            old_key_id,
            new_key_id: new_cipher.key_id(),
            rewritten,
            skipped,
        })
    }

    fn convert_all<T: RekeyTarget>(
        &self,
        target: &mut T,
        new: &CascadeCipher,
        old: &[CascadeCipher],
    ) -> Result<(usize, usize)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| GitCascadeError::Other(format!("failed to start worker pool: {e}")))?;

        let paths = target.encrypted_paths()?;
        let mut rewritten = 0;
        let mut skipped = 0;

        for batch in paths.chunks(self.options.batch_size.max(1)) {
            let blobs = batch
                .iter()
                .map(|path| Ok((path.clone(), target.read_stored(path)?)))
                .collect::<Result<Vec<_>>>()?;

            let converted = pool.install(|| {
                blobs
                    .par_iter()
                    .map(|(path, stored)| convert(path, stored, new, old))
                    .collect::<Result<Vec<_>>>()
            })?;

            for ((path, _), output) in blobs.iter().zip(converted) {
                match output {
                    Some(content) => {
                        target.stage(path, content)?;
                        rewritten += 1;
                    }
                    None => skipped += 1,
                }
            }
            target.flush()?;
            debug!(files = batch.len(), "flushed rekey batch");
        }

        Ok((rewritten, skipped))
    }
}

/// Re-encrypt one stored blob under `new`. `None` means it already is.
pub fn convert(
    path: &str,
    stored: &[u8],
    new: &CascadeCipher,
    old: &[CascadeCipher],
) -> Result<Option<Vec<u8>>> {
    let plaintext = match envelope::parse(stored) {
        Some((envelope, _, _)) if envelope.key_id == new.key_id() => {
            debug!(path, "already under new key");
            return Ok(None);
        }
        Some((envelope, _, _)) => {
            let cipher = old
                .iter()
                .find(|c| c.key_id() == envelope.key_id)
                .ok_or_else(|| {
                    warn!(path, key_id = %envelope.key_id, "no key for blob");
                    GitCascadeError::DecryptionFailed
                })?;
            cipher.decrypt(path, stored)?
        }
        // Magic with a version this build cannot read
        None if envelope::has_magic(stored) => return Err(GitCascadeError::DecryptionFailed),
        None => match old.iter().find_map(|c| c.decrypt(path, stored).ok()) {
            Some(plaintext) => {
                debug!(path, "upgrading headerless ciphertext");
                plaintext
            }
            None => {
                debug!(path, "encrypting blob stored as plaintext");
                stored.to_vec()
            }
        },
    };

    new.encrypt(path, &plaintext).map(Some)
}

//! # Key Storage
//!
//! Persists the repository keypair inside the git directory.
//!
//! ## Layout
//!
//! ```text
//! .git/git-cascade/
//! ├── keys/
//! │   ├── keypair          plaintext record, or
//! │   └── keypair.locked   password-protected record (never both)
//! └── backups/
//!     └── keypair-<UTC timestamp>.<plain|locked>.bak
//! ```
//!
//! - **Permissions**: 0600 on Unix for active records, 0400 for backups
//! - **Atomic writes**: records are written to a temp file, then renamed
//! - **Never committed**: everything stays in `.git/`
//!
//! ## Storage Modes
//!
//! - **Plaintext**: the serialized keypair as-is
//! - **Password-protected**: Argon2id + AES-256-GCM (see [`crate::protect`])
//!
//! Moving between modes is the job of [`crate::migrate::KeyMigrator`].
//!
//! ## Concurrency
//!
//! Writers hold `keys/.lock`, created with `create_new`. A second writer
//! fails fast with [`GitCascadeError::KeyStoreBusy`]. Reads take no lock.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::{GitCascadeError, Result};
use crate::keypair::Keypair;
use crate::protect::{self, KdfParams};

const PLAINTEXT_RECORD: &str = "keypair";
const PROTECTED_RECORD: &str = "keypair.locked";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Plaintext,
    PasswordProtected,
}

impl StorageMode {
    fn backup_suffix(self) -> &'static str {
        match self {
            StorageMode::Plaintext => "plain",
            StorageMode::PasswordProtected => "locked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreStatus {
    Uninitialized,
    Plaintext,
    PasswordProtected,
}

impl fmt::Display for KeyStoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyStoreStatus::Uninitialized => "uninitialized",
            KeyStoreStatus::Plaintext => "plaintext",
            KeyStoreStatus::PasswordProtected => "password-protected",
        })
    }
}

/// Key storage and management
pub struct KeyStore {
    git_dir: PathBuf,
    kdf: KdfParams,
}

impl KeyStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
            kdf: KdfParams::default(),
        }
    }

    /// Use these Argon2id parameters for records written from now on.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Get the path to the git-cascade directory
    pub fn git_cascade_dir(&self) -> PathBuf {
        self.git_dir.join("git-cascade")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.git_cascade_dir().join("keys")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.git_cascade_dir().join("backups")
    }

    pub fn plaintext_path(&self) -> PathBuf {
        self.keys_dir().join(PLAINTEXT_RECORD)
    }

    pub fn protected_path(&self) -> PathBuf {
        self.keys_dir().join(PROTECTED_RECORD)
    }

    pub fn record_path(&self, mode: StorageMode) -> PathBuf {
        match mode {
            StorageMode::Plaintext => self.plaintext_path(),
            StorageMode::PasswordProtected => self.protected_path(),
        }
    }

    /// Inspect which record is on disk. Reads no key material.
    pub fn status(&self) -> Result<KeyStoreStatus> {
        match (self.plaintext_path().is_file(), self.protected_path().is_file()) {
            (false, false) => Ok(KeyStoreStatus::Uninitialized),
            (true, false) => Ok(KeyStoreStatus::Plaintext),
            (false, true) => Ok(KeyStoreStatus::PasswordProtected),
            (true, true) => Err(GitCascadeError::ConflictingKeyRecords),
        }
    }

    /// Check if repository is initialized
    pub fn is_initialized(&self) -> bool {
        !matches!(self.status(), Ok(KeyStoreStatus::Uninitialized))
    }

    /// The storage mode of the active record, if any.
    pub fn mode(&self) -> Result<Option<StorageMode>> {
        Ok(match self.status()? {
            KeyStoreStatus::Uninitialized => None,
            KeyStoreStatus::Plaintext => Some(StorageMode::Plaintext),
            KeyStoreStatus::PasswordProtected => Some(StorageMode::PasswordProtected),
        })
    }

    /// Persist a keypair into an empty store.
    pub fn initialize(
        &self,
        keypair: &Keypair,
        mode: StorageMode,
        password: Option<&SecretString>,
    ) -> Result<PathBuf> {
        let _lock = self.lock()?;
        if self.status()? != KeyStoreStatus::Uninitialized {
            return Err(GitCascadeError::AlreadyInitialized);
        }

        let path = self.write_record(keypair, mode, password)?;
        info!(mode = ?mode, path = %path.display(), "key store initialized");
        Ok(path)
    }

    /// Load the active keypair.
    pub fn load(&self, password: Option<&SecretString>) -> Result<Keypair> {
        match self.status()? {
            KeyStoreStatus::Uninitialized => Err(GitCascadeError::NotInitialized),
            KeyStoreStatus::Plaintext => self.load_record(&self.plaintext_path(), password),
            KeyStoreStatus::PasswordProtected => {
                self.load_record(&self.protected_path(), password)
            }
        }
    }

    /// Load a keypair from any record file, including backups and exports.
    pub fn load_record(&self, path: &Path, password: Option<&SecretString>) -> Result<Keypair> {
        let bytes = fs::read(path)?;
        decode_record(&bytes, password)
    }

    /// Back up the active record and overwrite it with `keypair`, keeping
    /// the current storage mode. Returns the backup path.
    ///
    /// `password` must open the current record; the check, the backup and
    /// the write all happen under one writer lock.
    pub fn replace(&self, keypair: &Keypair, password: Option<&SecretString>) -> Result<PathBuf> {
        let _lock = self.lock()?;
        let mode = self.mode()?.ok_or(GitCascadeError::NotInitialized)?;
        self.load_record(&self.record_path(mode), password)?;

        let backup = self.backup_active()?;
        self.write_record(keypair, mode, password)?;
        info!(mode = ?mode, backup = %backup.display(), "active keypair replaced");
        Ok(backup)
    }

    /// Copy the active record into `backups/` under a new timestamped name.
    pub fn backup_active(&self) -> Result<PathBuf> {
        let mode = self.mode()?.ok_or(GitCascadeError::NotInitialized)?;
        let bytes = fs::read(self.record_path(mode))?;

        let backups = self.backups_dir();
        fs::create_dir_all(&backups)?;
        restrict_dir(&backups)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let suffix = mode.backup_suffix();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("keypair-{stamp}.{suffix}.bak")
            } else {
                format!("keypair-{stamp}-{attempt}.{suffix}.bak")
            };
            let path = backups.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&bytes)?;
                    file.sync_all()?;
                    drop(file);
                    set_mode(&path, 0o400)?;
                    info!(path = %path.display(), "backed up key record");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All backup files, newest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let dir = self.backups_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("bak") {
                paths.push(path);
            }
        }
        // Timestamps sort lexically
        paths.sort();
        paths.reverse();
        Ok(paths)
    }

    /// Delete the record for `mode`. Used once its replacement is verified.
    pub(crate) fn remove_record(&self, mode: StorageMode) -> Result<()> {
        let path = self.record_path(mode);
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "removed key record");
        Ok(())
    }

    /// Write a record for `mode` without checking the current status.
    pub(crate) fn write_record(
        &self,
        keypair: &Keypair,
        mode: StorageMode,
        password: Option<&SecretString>,
    ) -> Result<PathBuf> {
        let bytes = match mode {
            StorageMode::Plaintext => keypair.to_bytes(),
            StorageMode::PasswordProtected => {
                let password = password.ok_or(GitCascadeError::PasswordRequired)?;
                protect::seal_keypair(keypair, password, &self.kdf)?
            }
        };

        let keys = self.keys_dir();
        fs::create_dir_all(&keys)?;
        restrict_dir(&self.git_cascade_dir())?;
        restrict_dir(&keys)?;

        let path = self.record_path(mode);
        write_private(&path, &bytes)?;
        Ok(path)
    }

    /// Take the writer lock.
    pub(crate) fn lock(&self) -> Result<StoreLock> {
        let keys = self.keys_dir();
        fs::create_dir_all(&keys)?;

        let path = keys.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(StoreLock { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(GitCascadeError::KeyStoreBusy),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exclusive writer lock on a key store. Released on drop.
pub(crate) struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release key store lock");
        }
    }
}

/// Decode a record of either kind by its magic.
pub fn decode_record(bytes: &[u8], password: Option<&SecretString>) -> Result<Keypair> {
    if protect::is_protected(bytes) {
        let password = password.ok_or(GitCascadeError::PasswordRequired)?;
        protect::open_keypair(bytes, password)
    } else {
        Keypair::from_bytes(bytes)
    }
}

/// Check if the record bytes are password-protected
pub fn is_protected_record(bytes: &[u8]) -> bool {
    protect::is_protected(bytes)
}

/// Write `bytes` to `path` with owner-only permissions, atomically.
pub fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    let mut file = open_private(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    set_mode(&tmp, 0o600)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

// Set restrictive permissions (Unix only)
#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(mode);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    if mode & 0o200 == 0 {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn restrict_dir(path: &Path) -> Result<()> {
    if cfg!(unix) {
        set_mode(path, 0o700)?;
    }
    Ok(())
}

//! # Password Protection
//!
//! Wraps a serialized [`Keypair`] under a password-derived key.
//!
//! ## Format
//!
//! ```text
//! ["GCKL"][version: u8][m_cost: u32le][t_cost: u32le][p_cost: u32le]
//! [salt: 16][nonce: 12][tag: 16][ciphertext]
//! ```
//!
//! - **KDF**: Argon2id v1.3, parameters stored in the record
//! - **AEAD**: AES-256-GCM, detached tag, the 17-byte prefix through `p_cost`
//!   is associated data
//!
//! Every way of failing to open a record (wrong password, flipped bit,
//! truncated file, absurd parameters) returns
//! [`GitCascadeError::InvalidPassword`]. Callers cannot tell them apart.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{GitCascadeError, Result};
use crate::kdf::KEY_SIZE;
use crate::keypair::Keypair;

const MAGIC: &[u8; 4] = b"GCKL";
const VERSION: u8 = 1;
pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
const PARAMS_END: usize = MAGIC.len() + 1 + 12;
const PREFIX_SIZE: usize = PARAMS_END + SALT_SIZE + NONCE_SIZE + TAG_SIZE;

// Ceilings for both sealing and opening. Records are checked against them
// before Argon2 runs, so a crafted import file cannot demand more than
// 256 MiB or 1 GiB of total passes.
const MAX_MEMORY_KIB: u32 = 256 * 1024;
const MAX_ITERATIONS: u32 = 16;
const MAX_PARALLELISM: u32 = 16;
const MAX_COST_KIB: u64 = 1024 * 1024;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_kib: u32,
    /// Time cost / passes (default: 3)
    pub iterations: u32,
    /// Lanes (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    fn within_bounds(&self) -> bool {
        (1..=MAX_ITERATIONS).contains(&self.iterations)
            && (1..=MAX_PARALLELISM).contains(&self.parallelism)
            && self.memory_kib >= 8 * self.parallelism
            && self.memory_kib <= MAX_MEMORY_KIB
            && u64::from(self.memory_kib) * u64::from(self.iterations) <= MAX_COST_KIB
    }

    fn derive(&self, password: &SecretString, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| GitCascadeError::Config(format!("invalid Argon2id params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon2
            .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key[..])
            .map_err(|e| GitCascadeError::Other(format!("Argon2id KDF failed: {e}")))?;
        Ok(key)
    }
}

/// Encrypt a keypair under `password`.
pub fn seal_keypair(
    keypair: &Keypair,
    password: &SecretString,
    params: &KdfParams,
) -> Result<Vec<u8>> {
    if !params.within_bounds() {
        return Err(GitCascadeError::Config(format!(
            "Argon2id parameters out of range: {params:?}"
        )));
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .and_then(|()| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| GitCascadeError::Generation(e.to_string()))?;

    let kek = params.derive(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&kek[..])
        .map_err(|e| GitCascadeError::Other(e.to_string()))?;

    let mut prefix = Vec::with_capacity(PARAMS_END);
    prefix.extend_from_slice(MAGIC);
    prefix.push(VERSION);
    prefix.extend_from_slice(&params.memory_kib.to_le_bytes());
    prefix.extend_from_slice(&params.iterations.to_le_bytes());
    prefix.extend_from_slice(&params.parallelism.to_le_bytes());

    let mut buffer = Zeroizing::new(keypair.to_bytes());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), &prefix, buffer.as_mut_slice())
        .map_err(|_| GitCascadeError::Other("key record encryption failed".into()))?;

    let mut record = Vec::with_capacity(PREFIX_SIZE + buffer.len());
    record.extend_from_slice(&prefix);
    record.extend_from_slice(&salt);
    record.extend_from_slice(&nonce);
    record.extend_from_slice(&tag);
    record.extend_from_slice(&buffer);
    Ok(record)
}

/// Decrypt a record produced by [`seal_keypair`].
pub fn open_keypair(record: &[u8], password: &SecretString) -> Result<Keypair> {
    if record.len() < PREFIX_SIZE || !is_protected(record) || record[MAGIC.len()] != VERSION {
        return Err(GitCascadeError::InvalidPassword);
    }

    let params = KdfParams {
        memory_kib: read_u32(record, MAGIC.len() + 1),
        iterations: read_u32(record, MAGIC.len() + 5),
        parallelism: read_u32(record, MAGIC.len() + 9),
    };
    if !params.within_bounds() {
        return Err(GitCascadeError::InvalidPassword);
    }

    let (prefix, rest) = record.split_at(PARAMS_END);
    let (salt, rest) = rest.split_at(SALT_SIZE);
    let (nonce, rest) = rest.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let kek = params.derive(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&kek[..])
        .map_err(|e| GitCascadeError::Other(e.to_string()))?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            prefix,
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| GitCascadeError::InvalidPassword)?;

    Keypair::from_bytes(&buffer).map_err(|_| GitCascadeError::InvalidPassword)
}

/// Check if data starts with the protected record magic
pub fn is_protected(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && &data[..MAGIC.len()] == MAGIC
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

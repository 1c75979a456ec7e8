//! # Cascade Encryption
//!
//! File content passes through six independent AEAD ciphers. Each layer has
//! its own key and nonce derived from the file key (see [`crate::kdf`]), and
//! each adds its own 16-byte authentication tag.
//!
//! ## Layers
//!
//! | # | Cipher             | Key | Nonce |
//! |---|--------------------|-----|-------|
//! | 1 | AES-256-GCM        | 32  | 12    |
//! | 2 | ChaCha20-Poly1305  | 32  | 12    |
//! | 3 | AES-256-GCM-SIV    | 32  | 12    |
//! | 4 | XChaCha20-Poly1305 | 32  | 24    |
//! | 5 | AES-256-EAX        | 32  | 16    |
//! | 6 | AES-256-SIV        | 64  | 16    |
//!
//! Encryption folds L1..L6; decryption folds L6..L1. The two SIV layers
//! remain safe when a path's content changes under the same derived nonce.
//!
//! ## Encrypted Data Format
//!
//! ```text
//! [envelope header (18)][L6(L5(L4(L3(L2(L1(plaintext))))))]
//! ```
//!
//! The body is `plaintext.len() + 6 * 16` bytes. See [`crate::envelope`] for
//! the header.
//!
//! ## Security Properties
//!
//! - **Determinism**: same keypair, path and content give identical bytes
//! - **No partial feedback**: a failure in any layer surfaces as one
//!   [`GitCascadeError::DecryptionFailed`]
//! - **Header binding**: the envelope header is associated data for every layer

use aes::Aes256;
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{self, Aead, AeadCore, KeyInit, Nonce, Payload};
use aes_gcm::Aes256Gcm;
use aes_gcm_siv::Aes256GcmSiv;
use aes_siv::Aes256SivAead;
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use eax::Eax;
use rayon::prelude::*;
use tracing::debug;

use crate::envelope::{self, Envelope};
use crate::error::{GitCascadeError, Result};
use crate::kdf::{self, FileKey, KeyId, MasterKey};
use crate::keypair::Keypair;

pub const LAYER_COUNT: usize = 6;
pub const TAG_SIZE: usize = 16;

/// Total bytes the cascade adds to a plaintext, excluding the envelope header.
pub const CASCADE_OVERHEAD: usize = LAYER_COUNT * TAG_SIZE;

type SealFn = fn(&[u8], &[u8], &[u8], &[u8]) -> std::result::Result<Vec<u8>, aead::Error>;

/// One stage of the cascade.
pub struct Layer {
    pub name: &'static str,
    pub key_len: usize,
    pub nonce_len: usize,
    seal: SealFn,
    open: SealFn,
}

pub static LAYERS: [Layer; LAYER_COUNT] = [
    Layer {
        name: "AES-256-GCM",
        key_len: 32,
        nonce_len: 12,
        seal: seal_with::<Aes256Gcm>,
        open: open_with::<Aes256Gcm>,
    },
    Layer {
        name: "ChaCha20-Poly1305",
        key_len: 32,
        nonce_len: 12,
        seal: seal_with::<ChaCha20Poly1305>,
        open: open_with::<ChaCha20Poly1305>,
    },
    Layer {
        name: "AES-256-GCM-SIV",
        key_len: 32,
        nonce_len: 12,
        seal: seal_with::<Aes256GcmSiv>,
        open: open_with::<Aes256GcmSiv>,
    },
    Layer {
        name: "XChaCha20-Poly1305",
        key_len: 32,
        nonce_len: 24,
        seal: seal_with::<XChaCha20Poly1305>,
        open: open_with::<XChaCha20Poly1305>,
    },
    Layer {
        name: "AES-256-EAX",
        key_len: 32,
        nonce_len: 16,
        seal: seal_with::<Eax<Aes256>>,
        open: open_with::<Eax<Aes256>>,
    },
    Layer {
        name: "AES-256-SIV",
        key_len: 64,
        nonce_len: 16,
        seal: seal_with::<Aes256SivAead>,
        open: open_with::<Aes256SivAead>,
    },
];

fn seal_with<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    msg: &[u8],
) -> std::result::Result<Vec<u8>, aead::Error> {
    let cipher = A::new_from_slice(key).map_err(|_| aead::Error)?;
    if nonce.len() != <A as AeadCore>::NonceSize::USIZE {
        return Err(aead::Error);
    }
    cipher.encrypt(Nonce::<A>::from_slice(nonce), Payload { msg, aad })
}

fn open_with<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    msg: &[u8],
) -> std::result::Result<Vec<u8>, aead::Error> {
    let cipher = A::new_from_slice(key).map_err(|_| aead::Error)?;
    if nonce.len() != <A as AeadCore>::NonceSize::USIZE {
        return Err(aead::Error);
    }
    cipher.decrypt(Nonce::<A>::from_slice(nonce), Payload { msg, aad })
}

/// Encrypt through layers 1..6 under `file_key`.
pub fn seal(file_key: &FileKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    LAYERS
        .iter()
        .enumerate()
        .try_fold(plaintext.to_vec(), |data, (i, layer)| {
            let key = kdf::layer_key(file_key, i + 1)?;
            let nonce = kdf::layer_nonce(file_key, i + 1)?;
            (layer.seal)(&key, &nonce, aad, &data)
                .map_err(|_| GitCascadeError::Other(format!("{} encryption failed", layer.name)))
        })
}

/// Decrypt through layers 6..1 under `file_key`.
///
/// Stops at the first layer that fails authentication. The error never says
/// which one.
pub fn open(file_key: &FileKey, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < CASCADE_OVERHEAD {
        return Err(GitCascadeError::DecryptionFailed);
    }

    LAYERS
        .iter()
        .enumerate()
        .rev()
        .try_fold(ciphertext.to_vec(), |data, (i, layer)| {
            let key = kdf::layer_key(file_key, i + 1)?;
            let nonce = kdf::layer_nonce(file_key, i + 1)?;
            (layer.open)(&key, &nonce, aad, &data).map_err(|_| GitCascadeError::DecryptionFailed)
        })
}

/// The repository's content cipher: a master key plus its public id.
///
/// Holds no mutable state, so one instance can be shared across threads.
#[derive(Clone)]
pub struct CascadeCipher {
    master: MasterKey,
    key_id: KeyId,
}

impl CascadeCipher {
    pub fn new(master: MasterKey) -> Result<Self> {
        let key_id = master.key_id()?;
        Ok(Self { master, key_id })
    }

    pub fn from_keypair(keypair: &Keypair) -> Result<Self> {
        Self::new(keypair.master_key()?)
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Encrypt file content for storage in git.
    pub fn encrypt(&self, path: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let header = Envelope::new(self.key_id).header_bytes();
        let file_key = kdf::file_key(&self.master, path)?;
        let body = seal(&file_key, &header, plaintext)?;

        let mut result = Vec::with_capacity(header.len() + body.len());
        result.extend_from_slice(&header);
        result.extend_from_slice(&body);
        Ok(result)
    }

    /// Decrypt content produced by [`CascadeCipher::encrypt`].
    ///
    /// Input without an envelope header is treated as a bare cascade body
    /// with no associated data.
    pub fn decrypt(&self, path: &str, data: &[u8]) -> Result<Vec<u8>> {
        let file_key = kdf::file_key(&self.master, path)?;

        match envelope::parse(data) {
            Some((envelope, header, body)) => {
                if envelope.key_id != self.key_id {
                    debug!(
                        path,
                        expected = %self.key_id,
                        found = %envelope.key_id,
                        "key id mismatch"
                    );
                    return Err(GitCascadeError::DecryptionFailed);
                }
                open(&file_key, header, body)
            }
            None => open(&file_key, &[], data),
        }
    }

    /// Encrypt many files in parallel. Fails on the first error.
    pub fn encrypt_batch(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<Vec<u8>>> {
        files
            .par_iter()
            .map(|(path, plaintext)| self.encrypt(path, plaintext))
            .collect()
    }

    /// Decrypt many files in parallel. Fails on the first error.
    pub fn decrypt_batch(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<Vec<u8>>> {
        files
            .par_iter()
            .map(|(path, ciphertext)| self.decrypt(path, ciphertext))
            .collect()
    }
}

//! # Key Derivation
//!
//! Every key used to encrypt file content is derived deterministically:
//!
//! ```text
//! Keypair ──► MasterKey ──HKDF(salt = path)──► FileKey ──HKDF(info = layer)──► LayerKey[1..6]
//!                                                 └────SHA-512(file key, i)──► Nonce[1..6]
//! ```
//!
//! Nothing here draws randomness. The same keypair, path and content always
//! produce the same ciphertext, which keeps git's content-addressed storage
//! stable across clones and repeated `git add`.
//!
//! ## Primitives
//!
//! - **File key**: HKDF-SHA-512, salt = exact UTF-8 repository path, IKM = master key
//! - **Layer key**: HKDF-SHA-512 expand, info = context || layer index || cipher name
//! - **Layer nonce**: SHA-512(context || file key || layer index), truncated
//! - **Key id**: HMAC-SHA-256(master key, context), first 8 bytes

use std::fmt;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cascade::{Layer, LAYERS, LAYER_COUNT};
use crate::error::{GitCascadeError, Result};

pub const KEY_SIZE: usize = 32; // 256 bits
pub const KEY_ID_SIZE: usize = 8;

const FILE_KEY_INFO: &[u8] = b"git-cascade file key v1";
const LAYER_KEY_INFO: &[u8] = b"git-cascade layer key v1";
const LAYER_NONCE_CONTEXT: &[u8] = b"git-cascade layer nonce v1";
const KEY_ID_CONTEXT: &[u8] = b"git-cascade key id v1";

/// The repository-wide 256-bit symmetric key. Recomputed from the keypair,
/// never written to disk. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Public fingerprint of this key, safe to store next to ciphertext.
    pub fn key_id(&self) -> Result<KeyId> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.bytes)
            .map_err(|e| GitCascadeError::Other(format!("HMAC init failed: {e}")))?;
        mac.update(KEY_ID_CONTEXT);
        let tag = mac.finalize().into_bytes();

        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&tag[..KEY_ID_SIZE]);
        Ok(KeyId(id))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Short public identifier of a master key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; KEY_ID_SIZE]);

impl KeyId {
    pub fn from_bytes(bytes: [u8; KEY_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

/// Per-path key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the key for one repository path.
///
/// The path is used byte for byte as the HKDF salt, exactly as git passes it
/// to the filter (`%f`), so distinct paths never share a key.
pub fn file_key(master: &MasterKey, path: &str) -> Result<FileKey> {
    let hkdf = Hkdf::<Sha512>::new(Some(path.as_bytes()), master.as_bytes());

    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(FILE_KEY_INFO, &mut okm)
        .map_err(|e| GitCascadeError::Other(format!("HKDF expand failed: {e}")))?;
    Ok(FileKey::from_bytes(okm))
}

/// Derive the key for cascade layer `layer` (1-based), sized for its cipher.
pub fn layer_key(file_key: &FileKey, layer: usize) -> Result<Zeroizing<Vec<u8>>> {
    let entry = layer_entry(layer)?;
    let hkdf = Hkdf::<Sha512>::new(None, file_key.as_bytes());

    let mut info = Vec::with_capacity(LAYER_KEY_INFO.len() + 1 + entry.name.len());
    info.extend_from_slice(LAYER_KEY_INFO);
    info.push(layer as u8);
    info.extend_from_slice(entry.name.as_bytes());

    let mut okm = Zeroizing::new(vec![0u8; entry.key_len]);
    hkdf.expand(&info, okm.as_mut_slice())
        .map_err(|e| GitCascadeError::Other(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// Derive the nonce for cascade layer `layer` (1-based), sized for its cipher.
pub fn layer_nonce(file_key: &FileKey, layer: usize) -> Result<Vec<u8>> {
    let entry = layer_entry(layer)?;
    let digest = Sha512::new()
        .chain_update(LAYER_NONCE_CONTEXT)
        .chain_update(file_key.as_bytes())
        .chain_update([layer as u8])
        .finalize();
    Ok(digest[..entry.nonce_len].to_vec())
}

fn layer_entry(layer: usize) -> Result<&'static Layer> {
    if !(1..=LAYER_COUNT).contains(&layer) {
        return Err(GitCascadeError::InvalidLayer(layer));
    }
    Ok(&LAYERS[layer - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn master(byte: u8) -> MasterKey {
        MasterKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn test_file_key_is_deterministic() {
        let k1 = file_key(&master(7), "config/prod.env").unwrap();
        let k2 = file_key(&master(7), "config/prod.env").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_file_key_differs_per_path() {
        let a = file_key(&master(7), "a").unwrap();
        let b = file_key(&master(7), "b").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_file_key_differs_per_master() {
        let a = file_key(&master(1), "same.txt").unwrap();
        let b = file_key(&master(2), "same.txt").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_path_spellings_are_distinct() {
        // Each is a different file to git
        let paths = ["dir/x", "dir\\x", "./dir/x", "x", "./x", "x/", "X"];
        let keys: HashSet<[u8; KEY_SIZE]> = paths
            .iter()
            .map(|p| *file_key(&master(3), p).unwrap().as_bytes())
            .collect();
        assert_eq!(keys.len(), paths.len());
    }

    #[test]
    fn test_layer_keys_are_independent() {
        let fk = file_key(&master(9), "file").unwrap();
        let keys: HashSet<Vec<u8>> = (1..=LAYER_COUNT)
            .map(|i| layer_key(&fk, i).unwrap().to_vec())
            .collect();
        assert_eq!(keys.len(), LAYER_COUNT);
    }

    #[test]
    fn test_layer_material_matches_cipher_sizes() {
        let fk = file_key(&master(9), "file").unwrap();
        for (i, layer) in LAYERS.iter().enumerate() {
            assert_eq!(layer_key(&fk, i + 1).unwrap().len(), layer.key_len);
            assert_eq!(layer_nonce(&fk, i + 1).unwrap().len(), layer.nonce_len);
        }
    }

    #[test]
    fn test_layer_nonces_are_deterministic_and_distinct() {
        let fk = file_key(&master(4), "file").unwrap();
        assert_eq!(layer_nonce(&fk, 2).unwrap(), layer_nonce(&fk, 2).unwrap());
        // Layers 1-3 share a nonce length; their nonces must still differ
        assert_ne!(layer_nonce(&fk, 1).unwrap(), layer_nonce(&fk, 2).unwrap());
        assert_ne!(layer_nonce(&fk, 2).unwrap(), layer_nonce(&fk, 3).unwrap());
    }

    #[test]
    fn test_layer_index_out_of_range() {
        let fk = file_key(&master(4), "file").unwrap();
        assert!(matches!(layer_key(&fk, 0), Err(GitCascadeError::InvalidLayer(0))));
        assert!(matches!(layer_nonce(&fk, 7), Err(GitCascadeError::InvalidLayer(7))));
    }

    #[test]
    fn test_key_id_is_stable_and_distinct() {
        let id1 = master(1).key_id().unwrap();
        assert_eq!(id1, master(1).key_id().unwrap());
        assert_ne!(id1, master(2).key_id().unwrap());
        assert_eq!(id1.to_string().len(), KEY_ID_SIZE * 2);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", master(0xAB));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }
}

//! # Keypair
//!
//! The long-lived secret behind every repository key: an ML-KEM-768 keypair
//! plus a 32-byte classical secret.
//!
//! ## Master key derivation
//!
//! ```text
//! m        = SHA-512("git-cascade kem seed v1" || classical)[..32]
//! (ct, k)  = ML-KEM.EncapsDeterministic(ek, m)
//! shared   = ML-KEM.Decaps(dk, ct)              (must equal k)
//! master   = SHA-512(shared || classical)[..32]
//! ```
//!
//! The encapsulation is seeded from the classical secret, so every machine
//! holding the same keypair computes the same master key. Decapsulating with
//! the stored secret key proves that both KEM halves belong together.
//!
//! ## Serialized form
//!
//! ```text
//! ["GCKP"][version: u8][ek: 1184][dk: 2400][classical: 32]
//! ```

use std::fmt;

use ml_kem::kem::Decapsulate;
use ml_kem::{EncapsulateDeterministic, Encoded, EncodedSizeUser, KemCore, MlKem768, B32};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{GitCascadeError, Result};
use crate::kdf::{MasterKey, KEY_SIZE};

type Kem = MlKem768;
type EncapsulationKey = <Kem as KemCore>::EncapsulationKey;
type DecapsulationKey = <Kem as KemCore>::DecapsulationKey;

pub const KEM_PUBLIC_SIZE: usize = 1184;
pub const KEM_SECRET_SIZE: usize = 2400;
pub const CLASSICAL_SECRET_SIZE: usize = 32;

const MAGIC: &[u8; 4] = b"GCKP";
const VERSION: u8 = 1;
const HEADER_SIZE: usize = MAGIC.len() + 1;
pub const SERIALIZED_SIZE: usize =
    HEADER_SIZE + KEM_PUBLIC_SIZE + KEM_SECRET_SIZE + CLASSICAL_SECRET_SIZE;

const KEM_SEED_CONTEXT: &[u8] = b"git-cascade kem seed v1";

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    kem_public: Vec<u8>,
    kem_secret: Vec<u8>,
    classical_secret: [u8; CLASSICAL_SECRET_SIZE],
}

/// Generate a fresh keypair from the operating system RNG.
pub fn generate() -> Result<Keypair> {
    let mut rng = OsRng;
    let mut classical_secret = [0u8; CLASSICAL_SECRET_SIZE];
    rng.try_fill_bytes(&mut classical_secret)
        .map_err(|e| GitCascadeError::Generation(e.to_string()))?;

    let (dk, ek) = Kem::generate(&mut rng);

    Ok(Keypair {
        kem_public: ek.as_bytes().to_vec(),
        kem_secret: dk.as_bytes().to_vec(),
        classical_secret,
    })
}

impl Keypair {
    pub fn kem_public(&self) -> &[u8] {
        &self.kem_public
    }

    /// Recompute the master key. Pure function of the keypair.
    pub fn master_key(&self) -> Result<MasterKey> {
        let ek = decode_encapsulation_key(&self.kem_public)?;
        let dk = decode_decapsulation_key(&self.kem_secret)?;

        let seed = Sha512::new()
            .chain_update(KEM_SEED_CONTEXT)
            .chain_update(self.classical_secret)
            .finalize();
        let mut m = B32::default();
        m.copy_from_slice(&seed[..32]);

        let (ciphertext, encapsulated) = ek
            .encapsulate_deterministic(&m)
            .map_err(|_| GitCascadeError::InvalidKeyFormat)?;
        let shared = dk
            .decapsulate(&ciphertext)
            .map_err(|_| GitCascadeError::InvalidKeyFormat)?;

        if shared.as_slice() != encapsulated.as_slice() {
            return Err(GitCascadeError::InvalidKeyFormat);
        }

        let digest = Sha512::new()
            .chain_update(shared.as_slice())
            .chain_update(self.classical_secret)
            .finalize();
        let mut master = [0u8; KEY_SIZE];
        master.copy_from_slice(&digest[..KEY_SIZE]);
        Ok(MasterKey::from_bytes(master))
    }

    /// Serialize into the on-disk record body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERIALIZED_SIZE);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.kem_public);
        out.extend_from_slice(&self.kem_secret);
        out.extend_from_slice(&self.classical_secret);
        out
    }

    /// Parse a serialized keypair.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SERIALIZED_SIZE || !Self::is_serialized(bytes) {
            return Err(GitCascadeError::InvalidKeyFormat);
        }
        if bytes[MAGIC.len()] != VERSION {
            return Err(GitCascadeError::InvalidKeyFormat);
        }

        let body = &bytes[HEADER_SIZE..];
        let (kem_public, rest) = body.split_at(KEM_PUBLIC_SIZE);
        let (kem_secret, classical) = rest.split_at(KEM_SECRET_SIZE);

        let mut classical_secret = [0u8; CLASSICAL_SECRET_SIZE];
        classical_secret.copy_from_slice(classical);

        Ok(Self {
            kem_public: kem_public.to_vec(),
            kem_secret: kem_secret.to_vec(),
            classical_secret,
        })
    }

    /// Check if data starts with the serialized keypair magic
    pub fn is_serialized(data: &[u8]) -> bool {
        data.len() >= MAGIC.len() && &data[..MAGIC.len()] == MAGIC
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("kem_public", &format_args!("{} bytes", self.kem_public.len()))
            .field("kem_secret", &"[REDACTED]")
            .field("classical_secret", &"[REDACTED]")
            .finish()
    }
}

fn decode_encapsulation_key(bytes: &[u8]) -> Result<EncapsulationKey> {
    let encoded = Encoded::<EncapsulationKey>::try_from(bytes)
        .map_err(|_| GitCascadeError::InvalidKeyFormat)?;
    Ok(EncapsulationKey::from_bytes(&encoded))
}

fn decode_decapsulation_key(bytes: &[u8]) -> Result<DecapsulationKey> {
    let encoded = Encoded::<DecapsulationKey>::try_from(bytes)
        .map_err(|_| GitCascadeError::InvalidKeyFormat)?;
    Ok(DecapsulationKey::from_bytes(&encoded))
}

//! # git-cascade
//!
//! Transparent, post-quantum-keyed encryption of files in a git repository.
//!
//! ## Features
//!
//! - **Transparent Encryption**: Files are encrypted by git's clean filter on add and decrypted by the smudge filter on checkout
//! - **Six-Layer AEAD Cascade**: AES-256-GCM, ChaCha20-Poly1305, AES-256-GCM-SIV, XChaCha20-Poly1305, AES-256-EAX and AES-256-SIV in sequence
//! - **Post-Quantum Key Material**: The master key comes from an ML-KEM-768 keypair combined with a classical secret
//! - **Deterministic Output**: Identical content at the same path always encrypts to identical bytes, so git sees no spurious changes
//! - **Password Protection**: Optional Argon2id-wrapped key storage, with migration in both directions
//! - **Key Rotation**: Swap to a fresh keypair and re-encrypt every tracked file in parallel
//!
//! ## Quick Start
//!
//! ```bash
//! # Initialize in your git repository
//! git-cascade init
//!
//! # Configure which files to encrypt in .gitattributes
//! echo "*.secret filter=git-cascade diff=git-cascade" >> .gitattributes
//! git add .gitattributes
//! git commit -m "Configure git-cascade"
//!
//! # Add encrypted files (automatically encrypted)
//! echo "my secret data" > test.secret
//! git add test.secret
//! git commit -m "Add encrypted file"
//!
//! # Export a password-wrapped copy of the key for another machine
//! git-cascade export-key cascade-key.bin
//! ```
//!
//! ## How It Works
//!
//! **Encryption (git add):**
//! ```text
//! File content → clean filter → MasterKey → FileKey(path) → L1..L6 → envelope → .git
//! ```
//!
//! **Decryption (git checkout):**
//! ```text
//! Blob in .git → smudge filter → envelope → L6..L1 → working directory
//! ```
//!
//! The keypair lives in `.git/git-cascade/keys/` and is never committed.
//!
//! ### Key Derivation
//!
//! ```text
//! Keypair ──ML-KEM-768 decapsulation + classical secret──▶ MasterKey
//! MasterKey ──HKDF-SHA-512(salt = path)──▶ FileKey
//! FileKey ──HKDF-SHA-512(info = layer i, cipher)──▶ LayerKey[i]
//! FileKey ──SHA-512(layer i)──▶ Nonce[i]
//! ```
//!
//! Nothing is random per file. Nonces are fixed per `(key, path, layer)`,
//! which reuses them across revisions of the same path; the two SIV layers
//! keep that from breaking confidentiality of the cascade as a whole.
//!
//! ### Encrypted File Format
//!
//! ```text
//! ["\0GCASCADE"][version: 1][key id: 8 bytes][cascade body: plaintext + 96 bytes]
//! ```
//!
//! The header is authenticated by every layer. Bodies written without a
//! header are still readable.
//!
//! ## Module Overview
//!
//! - [`keypair`] - Keypair generation, serialization and master key derivation
//! - [`kdf`] - File key, layer key and nonce derivation
//! - [`cascade`] - The six-layer AEAD cascade and [`CascadeCipher`]
//! - [`envelope`] - Versioned header on encrypted blobs
//! - [`protect`] - Argon2id + AES-256-GCM password wrapping
//! - [`keystore`] - On-disk key records, backups and the writer lock
//! - [`migrate`] - Plaintext ⇄ password-protected migration
//! - [`rekey`] - Keypair rotation and re-encryption
//! - [`config`] - Layered settings
//! - [`git`] - Git filter integration and the index as a rotation target
//! - [`error`] - Error types and unified error handling
//!
//! ## Commands
//!
//! - `init [--password]` - Generate a keypair and configure filters
//! - `status` - Show key storage mode, key id and encrypted files
//! - `migrate --to <protected|plaintext>` - Change how the key is stored
//! - `rotate [--force] [--resume]` - Rotate to a fresh keypair
//! - `export-key OUTPUT [--armor]` - Write a password-wrapped key file
//! - `import-key INPUT [--force] [--plaintext]` - Install a key file
//! - `lock` / `unlock` - Remove or restore the filters
//!
//! ## Security Considerations
//!
//! **Protected against:**
//! - Unauthorized access to repository content, including by a future quantum adversary holding the history
//! - A break of any single AEAD construction
//! - Undetected modification of stored blobs
//!
//! **Not protected against:**
//! - Attacks on the working directory (files are plaintext there)
//! - Key extraction from `.git` when stored in plaintext mode
//! - Learning that two revisions of a path are identical
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib
//! cargo test --test integration_test
//! cargo test --test filter_test
//! cargo test --test edge_cases_test
//! cargo test --test property_test
//! ```

pub mod cascade;
pub mod config;
pub mod envelope;
pub mod error;
pub mod git;
pub mod kdf;
pub mod keypair;
pub mod keystore;
pub mod migrate;
pub mod protect;
pub mod rekey;

// Re-export commonly used types
pub use cascade::CascadeCipher;
pub use config::Settings;
pub use error::{GitCascadeError, Result};
pub use git::GitRepo;
pub use kdf::{KeyId, MasterKey};
pub use keypair::Keypair;
pub use keystore::{KeyStore, KeyStoreStatus, StorageMode};
pub use migrate::{KeyMigrator, MigrationReport};
pub use protect::KdfParams;
pub use rekey::{Rekeyer, RotateOptions, RotationReport};

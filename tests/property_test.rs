//! Property-based tests for the cascade
//!
//! 1. **Round-trip**: decrypt(encrypt(m, p), p) == m for all content and paths
//! 2. **Determinism**: same keypair, path and content give identical bytes
//! 3. **Isolation**: a different keypair or path never opens the blob
//! 4. **Tamper detection**: any single flipped bit is rejected
//! 5. **Key independence**: distinct paths derive distinct file keys

use std::sync::OnceLock;

use git_cascade::kdf::{file_key, MasterKey};
use git_cascade::{keypair, CascadeCipher, GitCascadeError};
use proptest::prelude::*;

fn cipher_a() -> &'static CascadeCipher {
    static CIPHER: OnceLock<CascadeCipher> = OnceLock::new();
    CIPHER.get_or_init(|| CascadeCipher::from_keypair(&keypair::generate().unwrap()).unwrap())
}

fn cipher_b() -> &'static CascadeCipher {
    static CIPHER: OnceLock<CascadeCipher> = OnceLock::new();
    CIPHER.get_or_init(|| CascadeCipher::from_keypair(&keypair::generate().unwrap()).unwrap())
}

// Random repository-relative path made of nanoid segments
fn repo_path() -> impl Strategy<Value = String> {
    (1usize..4).prop_map(|depth| {
        (0..depth)
            .map(|_| nanoid::nanoid!(8))
            .collect::<Vec<_>>()
            .join("/")
    })
}

// Paths git treats as different files even though they look alike
fn lookalike(path: String) -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        Just(format!("./{path}")),
        Just(path.replace('/', "\\")),
        Just(format!("{path}/")),
        Just(path.to_uppercase()),
        Just(format!("{path} ")),
    ]
    .prop_filter("must differ", {
        let path = path.clone();
        move |other| *other != path
    })
    .prop_map(move |other| (path.clone(), other))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_encrypt_decrypt_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        path in repo_path(),
    ) {
        let encrypted = cipher_a().encrypt(&path, &plaintext).unwrap();
        prop_assert_eq!(encrypted.len(), 18 + plaintext.len() + 96);

        let decrypted = cipher_a().decrypt(&path, &encrypted).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn prop_encryption_is_deterministic(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        path in repo_path(),
    ) {
        let first = cipher_a().encrypt(&path, &plaintext).unwrap();
        let second = cipher_a().encrypt(&path, &plaintext).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_other_key_cannot_decrypt(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        path in repo_path(),
    ) {
        let encrypted = cipher_a().encrypt(&path, &plaintext).unwrap();
        prop_assert!(matches!(
            cipher_b().decrypt(&path, &encrypted),
            Err(GitCascadeError::DecryptionFailed)
        ));
    }

    #[test]
    fn prop_other_path_cannot_decrypt(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        path in repo_path(),
        other in repo_path(),
    ) {
        prop_assume!(path != other);
        let encrypted = cipher_a().encrypt(&path, &plaintext).unwrap();
        prop_assert!(cipher_a().decrypt(&other, &encrypted).is_err());
    }

    #[test]
    fn prop_bit_flip_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        path in repo_path(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut encrypted = cipher_a().encrypt(&path, &plaintext).unwrap();
        let pos = index.index(encrypted.len());
        encrypted[pos] ^= 1 << bit;

        prop_assert!(cipher_a().decrypt(&path, &encrypted).is_err());
    }

    #[test]
    fn prop_distinct_paths_get_distinct_file_keys(
        master in any::<[u8; 32]>(),
        path in repo_path(),
        other in repo_path(),
    ) {
        prop_assume!(path != other);
        let master = MasterKey::from_bytes(master);
        let a = file_key(&master, &path).unwrap();
        let b = file_key(&master, &other).unwrap();
        prop_assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn prop_lookalike_paths_get_distinct_file_keys(
        master in any::<[u8; 32]>(),
        (path, other) in repo_path().prop_flat_map(lookalike),
    ) {
        let master = MasterKey::from_bytes(master);
        let a = file_key(&master, &path).unwrap();
        let b = file_key(&master, &other).unwrap();
        prop_assert_ne!(a.as_bytes(), b.as_bytes());
    }
}

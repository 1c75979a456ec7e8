//! Versioned header stored in front of every encrypted blob.
//!
//! ```text
//! ["\0GCASCADE"][version: u8][key id: 8 bytes]
//! ```
//!
//! The leading NUL makes git treat encrypted blobs as binary. The key id
//! tells which keypair a blob was written under, which lets key rotation
//! skip blobs that are already converted. Readers must still accept bare
//! cascade bodies without a header.

use crate::kdf::{KeyId, KEY_ID_SIZE};

pub const MAGIC: &[u8; 9] = b"\0GCASCADE";
pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + KEY_ID_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    pub key_id: KeyId,
}

impl Envelope {
    pub fn new(key_id: KeyId) -> Self {
        Self {
            version: VERSION,
            key_id,
        }
    }

    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[MAGIC.len()] = self.version;
        header[MAGIC.len() + 1..].copy_from_slice(self.key_id.as_bytes());
        header
    }
}

/// Check if data starts with the envelope magic
pub fn has_magic(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && &data[..MAGIC.len()] == MAGIC
}

/// Split `data` into its envelope, raw header bytes and body.
///
/// Returns `None` when the magic is missing, the data is shorter than a
/// header, or the version is not one this build understands.
pub fn parse(data: &[u8]) -> Option<(Envelope, &[u8], &[u8])> {
    if data.len() < HEADER_SIZE || !has_magic(data) {
        return None;
    }

    let version = data[MAGIC.len()];
    if version != VERSION {
        return None;
    }

    let mut key_id = [0u8; KEY_ID_SIZE];
    key_id.copy_from_slice(&data[MAGIC.len() + 1..HEADER_SIZE]);

    let (header, body) = data.split_at(HEADER_SIZE);
    Some((
        Envelope {
            version,
            key_id: KeyId::from_bytes(key_id),
        },
        header,
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_id() -> KeyId {
        KeyId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn test_header_layout() {
        let header = Envelope::new(key_id()).header_bytes();
        assert_eq!(header.len(), 18);
        assert_eq!(&header[..9], MAGIC);
        assert_eq!(header[9], VERSION);
        assert_eq!(&header[10..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_parse_splits_header_and_body() {
        let mut data = Envelope::new(key_id()).header_bytes().to_vec();
        data.extend_from_slice(b"body");

        let (envelope, header, body) = parse(&data).unwrap();
        assert_eq!(envelope, Envelope::new(key_id()));
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(body, b"body");
    }

    #[test]
    fn test_parse_rejects_headerless_and_unknown_versions() {
        assert!(parse(b"plain text file").is_none());
        assert!(parse(&MAGIC[..]).is_none());

        let mut future = Envelope::new(key_id()).header_bytes();
        future[MAGIC.len()] = VERSION + 1;
        assert!(parse(&future).is_none());
        assert!(has_magic(&future));
    }
}

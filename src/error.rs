use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitCascadeError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Invalid password or corrupted key record")]
    InvalidPassword,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Key is already password-protected")]
    AlreadyProtected,

    #[error("Key is already stored in plaintext")]
    AlreadyPlaintext,

    #[error("No plaintext key to protect. Run 'git-cascade init' first")]
    NoPlaintextKey,

    #[error("No password-protected key to unprotect. Run 'git-cascade init --password' first")]
    NoEncryptedKey,

    #[error("Repository not initialized. Run 'git-cascade init' first")]
    NotInitialized,

    #[error("Repository already initialized")]
    AlreadyInitialized,

    #[error("A password is required for the password-protected key")]
    PasswordRequired,

    #[error("Invalid key format")]
    InvalidKeyFormat,

    #[error("Invalid cascade layer index: {0}")]
    InvalidLayer(usize),

    #[error("Both a plaintext and a password-protected key record exist; remove one manually")]
    ConflictingKeyRecords,

    #[error("Another git-cascade process is modifying the key store")]
    KeyStoreBusy,

    #[error("Encrypted files have staged changes ({}); commit them or pass --force", .0.join(", "))]
    PendingChanges(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not in a git repository")]
    NotInGitRepo,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GitCascadeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_failure_carries_no_detail() {
        assert_eq!(GitCascadeError::DecryptionFailed.to_string(), "Decryption failed");
    }

    #[test]
    fn pending_changes_lists_paths() {
        let err = GitCascadeError::PendingChanges(vec!["a.env".into(), "b.key".into()]);
        let message = err.to_string();
        assert!(message.contains("a.env, b.key"));
        assert!(message.contains("--force"));
    }
}

use git_cascade::{GitCascadeError, KeyStore, KeyStoreStatus, Result};
use secrecy::{ExposeSecret, SecretString};

/// Read instead of prompting when set
pub const PASSWORD_ENV: &str = "GIT_CASCADE_PASSWORD";

/// Password for an existing record.
pub fn read_password(prompt: &str) -> Result<SecretString> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(password));
    }
    let password = rpassword::prompt_password(prompt)?;
    Ok(SecretString::from(password))
}

/// A new password, confirmed when typed interactively.
pub fn new_password(prompt: &str) -> Result<SecretString> {
    let password = if let Ok(password) = std::env::var(PASSWORD_ENV) {
        SecretString::from(password)
    } else {
        let first = SecretString::from(rpassword::prompt_password(prompt)?);
        let second = SecretString::from(rpassword::prompt_password("Confirm password: ")?);
        if first.expose_secret() != second.expose_secret() {
            return Err(GitCascadeError::Other("Passwords do not match".into()));
        }
        first
    };

    if password.expose_secret().is_empty() {
        return Err(GitCascadeError::Other("Password must not be empty".into()));
    }
    Ok(password)
}

/// The store's password if it is protected, otherwise `None`.
pub fn password_for(store: &KeyStore) -> Result<Option<SecretString>> {
    match store.status()? {
        KeyStoreStatus::PasswordProtected => {
            read_password("git-cascade key password: ").map(Some)
        }
        KeyStoreStatus::Plaintext | KeyStoreStatus::Uninitialized => Ok(None),
    }
}

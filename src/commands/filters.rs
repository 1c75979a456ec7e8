use super::password::password_for;
use super::Context;
use git_cascade::git::{clean_filter, smudge_filter};
use git_cascade::{CascadeCipher, GitCascadeError, Result};
use std::io;

fn load_cipher() -> Result<CascadeCipher> {
    let ctx = Context::open()?;

    if !ctx.store.is_initialized() {
        return Err(GitCascadeError::NotInitialized);
    }

    let password = password_for(&ctx.store)?;
    let keypair = ctx.store.load(password.as_ref())?;
    CascadeCipher::from_keypair(&keypair)
}

/// Clean filter implementation (called by git during add/commit)
pub fn clean(path: &str) -> Result<()> {
    let cipher = load_cipher()?;
    clean_filter(&cipher, path, &mut io::stdin().lock(), &mut io::stdout().lock())
}

/// Smudge filter implementation (called by git during checkout)
pub fn smudge(path: &str) -> Result<()> {
    let cipher = load_cipher()?;
    smudge_filter(&cipher, path, &mut io::stdin().lock(), &mut io::stdout().lock())
}


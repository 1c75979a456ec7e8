use super::password::password_for;
use super::{filter_program, Context};
use git_cascade::{CascadeCipher, GitCascadeError, Result};

/// Unlock the repository (make encrypted files readable)
pub fn unlock() -> Result<()> {
    println!("Unlocking repository...");

    let ctx = Context::open()?;

    // Check if initialized
    if !ctx.store.is_initialized() {
        return Err(GitCascadeError::NotInitialized);
    }

    // Load the key to verify it (and the password) works
    let password = password_for(&ctx.store)?;
    let keypair = ctx.store.load(password.as_ref())?;
    let key_id = CascadeCipher::from_keypair(&keypair)?.key_id();

    // Configure filters
    ctx.repo.configure_filters(&filter_program())?;

    println!("Repository unlocked with key {key_id}");
    println!("\nRun 'git checkout HEAD -- .' to decrypt all tracked files");

    Ok(())
}

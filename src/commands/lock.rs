use super::Context;
use git_cascade::{GitCascadeError, Result};

/// Lock the repository (remove filters and show encrypted content)
pub fn lock() -> Result<()> {
    println!("Locking repository...");

    let ctx = Context::open()?;

    // Check if initialized
    if !ctx.store.is_initialized() {
        return Err(GitCascadeError::NotInitialized);
    }

    // Remove git filters
    ctx.repo.remove_filters()?;

    println!("Repository locked!");
    println!("\nEncrypted files will now show their encrypted content.");
    println!("Run 'git-cascade unlock' to restore access.");

    Ok(())
}

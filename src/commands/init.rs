use super::password::new_password;
use super::{filter_program, Context};
use git_cascade::{keypair, CascadeCipher, GitCascadeError, Result, StorageMode};

/// Initialize git-cascade in the repository
pub fn init(with_password: bool) -> Result<()> {
    println!("Initializing git-cascade...");

    let ctx = Context::open()?;

    // Check if already initialized
    if ctx.store.is_initialized() {
        return Err(GitCascadeError::AlreadyInitialized);
    }

    let (mode, password) = if with_password {
        let password = new_password("New key password: ")?;
        (StorageMode::PasswordProtected, Some(password))
    } else {
        (StorageMode::Plaintext, None)
    };

    // Generate and save keypair
    let keypair = keypair::generate()?;
    let key_id = CascadeCipher::from_keypair(&keypair)?.key_id();
    let path = ctx.store.initialize(&keypair, mode, password.as_ref())?;
    println!("Generated new keypair {key_id}");
    println!("Stored at {}", path.display());

    // Configure git filters
    ctx.repo.configure_filters(&filter_program())?;
    println!("Configured git filters");

    println!("\nInitialization complete!");
    println!("\nNext steps:");
    println!("1. Create a .gitattributes file to specify which files to encrypt");
    println!("   Example: echo 'secretfile filter=git-cascade diff=git-cascade' >> .gitattributes");
    println!("2. Commit the .gitattributes file");
    if mode == StorageMode::Plaintext {
        println!("3. Consider 'git-cascade migrate --to protected' to password-protect the key");
    }

    Ok(())
}

use super::password::PASSWORD_ENV;
use super::Context;
use git_cascade::{CascadeCipher, KeyId, KeyStoreStatus, Result};
use secrecy::SecretString;

/// Show key storage and the state of encrypted files
pub fn status() -> Result<()> {
    let ctx = Context::open()?;
    let store_status = ctx.store.status()?;

    println!("Key storage: {store_status}");
    if store_status == KeyStoreStatus::Uninitialized {
        println!("\nRun 'git-cascade init' to get started.");
        return Ok(());
    }

    // Never prompt here; only show what is readable without interaction
    let current = current_key_id(&ctx, store_status);
    match current {
        Some(id) => println!("Key id: {id}"),
        None => println!("Key id: (locked, set {PASSWORD_ENV} to show)"),
    }

    let filters = if ctx.repo.filters_configured()? {
        "configured"
    } else {
        "not configured (locked)"
    };
    println!("Filters: {filters}");
    println!("Backups: {}", ctx.store.backups()?.len());

    let files = ctx.repo.encrypted_files()?;
    if files.is_empty() {
        println!("\nNo encrypted files tracked.");
        return Ok(());
    }

    println!("\nEncrypted files:");
    for (path, key_id) in files {
        let state = match (key_id, current) {
            (None, _) => "not encrypted".to_string(),
            (Some(id), Some(cur)) if id == cur => "current key".to_string(),
            (Some(id), Some(_)) => format!("old key {id}, run 'git-cascade rotate --resume'"),
            (Some(id), None) => format!("key {id}"),
        };
        println!("    {path}: {state}");
    }

    Ok(())
}

fn current_key_id(ctx: &Context, status: KeyStoreStatus) -> Option<KeyId> {
    let password = match status {
        KeyStoreStatus::PasswordProtected => {
            Some(SecretString::from(std::env::var(PASSWORD_ENV).ok()?))
        }
        _ => None,
    };
    let keypair = ctx.store.load(password.as_ref()).ok()?;
    CascadeCipher::from_keypair(&keypair).ok().map(|c| c.key_id())
}

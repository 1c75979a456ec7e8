use super::password::{new_password, password_for, read_password};
use super::{filter_program, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use git_cascade::keystore::{self, write_private};
use git_cascade::{protect, CascadeCipher, GitCascadeError, Keypair, Result, StorageMode};
use std::fs;
use std::path::Path;

/// Export the keypair to a password-wrapped file
pub fn export_key(output_path: &Path, armor: bool) -> Result<()> {
    println!("Exporting key to: {}", output_path.display());

    let ctx = Context::open()?;

    // Check if initialized
    if !ctx.store.is_initialized() {
        return Err(GitCascadeError::NotInitialized);
    }

    let password = password_for(&ctx.store)?;
    let keypair = ctx.store.load(password.as_ref())?;

    let export_password = match password {
        Some(password) => password,
        None => new_password("Password for the exported key: ")?,
    };
    let sealed = protect::seal_keypair(&keypair, &export_password, &ctx.settings.kdf)?;

    if armor {
        let mut text = STANDARD.encode(&sealed);
        text.push('\n');
        write_private(output_path, text.as_bytes())?;
    } else {
        write_private(output_path, &sealed)?;
    }

    let key_id = CascadeCipher::from_keypair(&keypair)?.key_id();
    println!("Key {key_id} exported successfully!");
    println!("\nWARNING: Keep this key file and its password secure!");
    println!("Anyone with both can decrypt your encrypted files.");

    Ok(())
}

/// Import a keypair from an exported file
pub fn import_key(input_path: &Path, force: bool, plaintext: bool) -> Result<()> {
    println!("Importing key from: {}", input_path.display());

    let ctx = Context::open()?;
    if ctx.store.is_initialized() && !force {
        return Err(GitCascadeError::AlreadyInitialized);
    }

    let bytes = dearmor(fs::read(input_path)?);
    let file_password = if keystore::is_protected_record(&bytes) {
        Some(read_password("Key file password: ")?)
    } else {
        None
    };
    let keypair = keystore::decode_record(&bytes, file_password.as_ref())?;
    let key_id = CascadeCipher::from_keypair(&keypair)?.key_id();

    match ctx.store.mode()? {
        Some(_) => {
            let password = password_for(&ctx.store)?;
            let backup = ctx.store.replace(&keypair, password.as_ref())?;
            println!("Previous key backed up to {}", backup.display());
        }
        None => install(&ctx, &keypair, plaintext, file_password)?,
    }

    ctx.repo.configure_filters(&filter_program())?;

    println!("Key {key_id} imported successfully!");
    println!("\nRun 'git checkout HEAD -- .' to decrypt all tracked files");

    Ok(())
}

fn install(
    ctx: &Context,
    keypair: &Keypair,
    plaintext: bool,
    file_password: Option<secrecy::SecretString>,
) -> Result<()> {
    if plaintext {
        ctx.store.initialize(keypair, StorageMode::Plaintext, None)?;
        return Ok(());
    }

    let password = match file_password {
        Some(password) => password,
        None => new_password("New key password: ")?,
    };
    ctx.store
        .initialize(keypair, StorageMode::PasswordProtected, Some(&password))?;
    Ok(())
}

/// Undo `--armor`; binary input comes back unchanged.
fn dearmor(bytes: Vec<u8>) -> Vec<u8> {
    if keystore::is_protected_record(&bytes) || Keypair::is_serialized(&bytes) {
        return bytes;
    }
    let text: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(&text).unwrap_or(bytes)
}

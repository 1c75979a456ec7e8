use super::password::{new_password, read_password};
use super::Context;
use clap::ValueEnum;
use git_cascade::{KeyMigrator, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MigrateTarget {
    /// Password-protected (Argon2id + AES-256-GCM)
    Protected,
    /// Plaintext, owner-only file permissions
    Plaintext,
}

/// Move the key between plaintext and password-protected storage
pub fn migrate(to: MigrateTarget) -> Result<()> {
    let ctx = Context::open()?;
    let migrator = KeyMigrator::new(&ctx.store);

    let report = match to {
        MigrateTarget::Protected => {
            println!("Protecting key with a password...");
            let password = new_password("New key password: ")?;
            migrator.to_password_protected(&password)?
        }
        MigrateTarget::Plaintext => {
            println!("Removing password protection...");
            let password = read_password("Current key password: ")?;
            migrator.to_plaintext(&password)?
        }
    };

    println!("Key migrated successfully!");
    println!("Active record: {}", report.active.display());
    println!("Backup of previous record: {}", report.backup.display());

    Ok(())
}

use super::password::password_for;
use super::Context;
use git_cascade::{Rekeyer, Result};

/// Rotate to a fresh keypair and re-encrypt tracked files
pub fn rotate(force: bool, resume: bool) -> Result<()> {
    let ctx = Context::open()?;
    let password = password_for(&ctx.store)?;
    let rekeyer = Rekeyer::new(&ctx.store, ctx.settings.rotate_options(force));
    let mut target = ctx.repo.index_target()?;

    let report = if resume {
        println!("Resuming key rotation...");
        rekeyer.resume(&mut target, password.as_ref())?
    } else {
        println!("Rotating keys...");
        rekeyer.rotate(&mut target, password.as_ref())?
    };

    if let Some(old) = report.old_key_id {
        println!("Old key: {old}");
    }
    println!("New key: {}", report.new_key_id);
    if let Some(backup) = &report.backup {
        println!("Backup: {}", backup.display());
    }
    println!(
        "Re-encrypted {} file(s), {} already current",
        report.rewritten, report.skipped
    );

    println!("\nKey rotation complete!");
    if report.rewritten > 0 {
        println!("Commit the staged changes to finish: git commit -m 'Rotate git-cascade key'");
    }
    println!("Share the new key with 'git-cascade export-key'. The old key still opens history.");

    Ok(())
}

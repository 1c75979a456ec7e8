//! # Integration Tests
//!
//! End-to-end workflows through the `git-cascade` binary and real git.
//!
//! ## Test Coverage
//!
//! - Repository initialization in both storage modes
//! - Storage migration and backups
//! - Key export and import across repositories
//! - Lock and unlock cycles
//! - Full add/commit/checkout with the filters wired into git
//! - Key rotation of committed files
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test integration_test
//! ```

mod common;

use common::{create_git_repo, git, git_cascade_cmd, init_repo, key_id, PASSWORD_ENV};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SECRET: &[u8] = b"DATABASE_URL=postgres://admin:hunter2@db/prod\n";

fn keys_dir(repo: &Path) -> std::path::PathBuf {
    repo.join(".git/git-cascade/keys")
}

fn backups(repo: &Path) -> usize {
    fs::read_dir(repo.join(".git/git-cascade/backups"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Commit `.gitattributes` and one encrypted file.
fn commit_secret(repo: &Path) {
    fs::write(
        repo.join(".gitattributes"),
        "*.env filter=git-cascade diff=git-cascade\n",
    )
    .unwrap();
    git(repo, &["add", ".gitattributes"]);
    git(repo, &["commit", "-m", "Configure git-cascade"]);

    fs::write(repo.join("prod.env"), SECRET).unwrap();
    git(repo, &["add", "prod.env"]);
    git(repo, &["commit", "-m", "Add secret"]);
}

fn stored_blob(repo: &Path, rev: &str) -> Vec<u8> {
    git(repo, &["cat-file", "blob", rev]).stdout
}

#[test]
fn test_init_command() {
    let temp = create_git_repo();

    git_cascade_cmd()
        .arg("init")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing git-cascade"))
        .stdout(predicate::str::contains("Generated new keypair"));

    // Verify directory structure was created
    assert!(keys_dir(temp.path()).join("keypair").exists());
    assert!(!keys_dir(temp.path()).join("keypair.locked").exists());

    let smudge = git(temp.path(), &["config", "--get", "filter.git-cascade.smudge"]);
    assert!(String::from_utf8_lossy(&smudge.stdout).contains("smudge %f"));
}

#[test]
fn test_init_twice_fails() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);

    git_cascade_cmd()
        .arg("init")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Repository already initialized"));
}

#[test]
fn test_init_outside_git_repo_fails() {
    let temp = TempDir::new().unwrap();

    git_cascade_cmd()
        .arg("init")
        .current_dir(temp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Not in a git repository"));
}

#[test]
fn test_init_with_password() {
    let temp = create_git_repo();
    init_repo(temp.path(), Some("Sn0wman!"));

    assert!(keys_dir(temp.path()).join("keypair.locked").exists());
    assert!(!keys_dir(temp.path()).join("keypair").exists());

    git_cascade_cmd()
        .arg("status")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Key storage: password-protected"))
        .stdout(predicate::str::contains("locked"));
}

#[test]
fn test_status_reports_key_and_files() {
    let temp = create_git_repo();

    git_cascade_cmd()
        .arg("status")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Key storage: uninitialized"));

    init_repo(temp.path(), None);
    commit_secret(temp.path());
    let id = key_id(temp.path(), None);
    assert_eq!(id.len(), 16);

    git_cascade_cmd()
        .arg("status")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Key storage: plaintext"))
        .stdout(predicate::str::contains("Filters: configured"))
        .stdout(predicate::str::contains("prod.env: current key"));
}

#[test]
fn test_migrate_round_trip_keeps_key() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    let original = key_id(temp.path(), None);

    git_cascade_cmd()
        .args(["migrate", "--to", "protected"])
        .env(PASSWORD_ENV, "correctPW")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Key migrated successfully"));

    assert!(keys_dir(temp.path()).join("keypair.locked").exists());
    assert!(!keys_dir(temp.path()).join("keypair").exists());
    assert_eq!(key_id(temp.path(), Some("correctPW")), original);

    git_cascade_cmd()
        .args(["migrate", "--to", "plaintext"])
        .env(PASSWORD_ENV, "correctPW")
        .current_dir(temp.path())
        .assert()
        .success();

    assert!(keys_dir(temp.path()).join("keypair").exists());
    assert_eq!(key_id(temp.path(), None), original);
    assert_eq!(backups(temp.path()), 2);
}

#[test]
fn test_migrate_errors() {
    let temp = create_git_repo();

    git_cascade_cmd()
        .args(["migrate", "--to", "protected"])
        .env(PASSWORD_ENV, "pw")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No plaintext key"));

    init_repo(temp.path(), Some("correctPW"));

    git_cascade_cmd()
        .args(["migrate", "--to", "plaintext"])
        .env(PASSWORD_ENV, "wrongPW")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid password"));

    git_cascade_cmd()
        .args(["migrate", "--to", "protected"])
        .env(PASSWORD_ENV, "correctPW")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already password-protected"));

    assert!(keys_dir(temp.path()).join("keypair.locked").exists());
    assert_eq!(backups(temp.path()), 0);
}

#[test]
fn test_export_and_import_key() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    let original = key_id(temp.path(), None);

    let key_file = temp.path().join("exported.key");
    git_cascade_cmd()
        .args(["export-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("exported successfully"));

    // Never a bare keypair on disk
    let exported = fs::read(&key_file).unwrap();
    assert!(exported.starts_with(b"GCKL"));

    // Import into a fresh repo, stored in plaintext
    let temp2 = create_git_repo();
    git_cascade_cmd()
        .args(["import-key", key_file.to_str().unwrap(), "--plaintext"])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp2.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("imported successfully"));

    assert_eq!(key_id(temp2.path(), None), original);
}

#[test]
fn test_armored_export_imports_protected() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    let original = key_id(temp.path(), None);

    let key_file = temp.path().join("exported.txt");
    git_cascade_cmd()
        .args(["export-key", key_file.to_str().unwrap(), "--armor"])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp.path())
        .assert()
        .success();
    let text = fs::read_to_string(&key_file).unwrap();
    assert!(text.trim().chars().all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c)));

    let temp2 = create_git_repo();
    git_cascade_cmd()
        .args(["import-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp2.path())
        .assert()
        .success();

    assert!(keys_dir(temp2.path()).join("keypair.locked").exists());
    assert_eq!(key_id(temp2.path(), Some("transport")), original);
}

#[test]
fn test_import_over_existing_key_requires_force() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    let key_file = temp.path().join("exported.key");
    git_cascade_cmd()
        .args(["export-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp.path())
        .assert()
        .success();

    let temp2 = create_git_repo();
    init_repo(temp2.path(), None);

    git_cascade_cmd()
        .args(["import-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp2.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    git_cascade_cmd()
        .args(["import-key", key_file.to_str().unwrap(), "--force"])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp2.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("backed up"));

    assert_eq!(key_id(temp2.path(), None), key_id(temp.path(), None));
    assert_eq!(backups(temp2.path()), 1);
}

#[test]
fn test_import_with_wrong_password_fails() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    let key_file = temp.path().join("exported.key");
    git_cascade_cmd()
        .args(["export-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "transport")
        .current_dir(temp.path())
        .assert()
        .success();

    let temp2 = create_git_repo();
    git_cascade_cmd()
        .args(["import-key", key_file.to_str().unwrap()])
        .env(PASSWORD_ENV, "guess")
        .current_dir(temp2.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid password"));

    assert!(!keys_dir(temp2.path()).join("keypair.locked").exists());
}

#[test]
fn test_export_key_before_init_fails() {
    let temp = create_git_repo();
    let key_file = temp.path().join("exported.key");

    git_cascade_cmd()
        .args(["export-key", key_file.to_str().unwrap()])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn test_lock_and_unlock() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);

    git_cascade_cmd()
        .arg("lock")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Repository locked"));

    let output = common::git_command(temp.path())
        .args(["config", "--get", "filter.git-cascade.smudge"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    git_cascade_cmd()
        .arg("unlock")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Repository unlocked"));

    git(temp.path(), &["config", "--get", "filter.git-cascade.smudge"]);
}

#[test]
fn test_unlock_wrong_password_keeps_locked() {
    let temp = create_git_repo();
    init_repo(temp.path(), Some("right"));
    git_cascade_cmd()
        .arg("lock")
        .current_dir(temp.path())
        .assert()
        .success();

    git_cascade_cmd()
        .arg("unlock")
        .env(PASSWORD_ENV, "wrong")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid password"));

    git_cascade_cmd()
        .arg("status")
        .current_dir(temp.path())
        .assert()
        .stdout(predicate::str::contains("not configured"));
}

#[test]
fn test_help_command() {
    git_cascade_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cascade encryption"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("rotate"));
}

#[test]
fn test_version_command() {
    git_cascade_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_full_workflow_with_encryption() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    commit_secret(temp.path());

    // Stored blob is encrypted, working tree is not
    let blob = stored_blob(temp.path(), "HEAD:prod.env");
    assert!(blob.starts_with(b"\0GCASCADE"));
    assert_eq!(blob.len(), 18 + SECRET.len() + 96);
    assert_eq!(fs::read(temp.path().join("prod.env")).unwrap(), SECRET);

    // Working tree is clean: deterministic encryption reproduces the blob
    let status = git(temp.path(), &["status", "--porcelain"]);
    assert!(status.stdout.is_empty());

    // Checkout runs the smudge filter
    fs::remove_file(temp.path().join("prod.env")).unwrap();
    git(temp.path(), &["checkout", "--", "prod.env"]);
    assert_eq!(fs::read(temp.path().join("prod.env")).unwrap(), SECRET);

    // History diffs show neither plaintext nor ciphertext
    for args in [
        &["log", "-p", "-1", "--", "prod.env"][..],
        &["log", "-p", "-1", "--textconv", "--", "prod.env"][..],
    ] {
        let diff = git(temp.path(), args);
        let stdout = String::from_utf8_lossy(&diff.stdout);
        assert!(stdout.contains("Binary files"), "{stdout}");
        assert!(!stdout.contains("hunter2"), "{stdout}");
    }

    // Worktree edits are suppressed as well
    fs::write(temp.path().join("prod.env"), b"DATABASE_URL=changed\n").unwrap();
    let diff = git(temp.path(), &["diff", "--", "prod.env"]);
    let stdout = String::from_utf8_lossy(&diff.stdout);
    assert!(stdout.contains("Binary files"), "{stdout}");
    assert!(!stdout.contains("changed"), "{stdout}");
}

#[test]
fn test_workflow_with_protected_key() {
    let temp = create_git_repo();
    init_repo(temp.path(), Some("Sn0wman!"));

    fs::write(temp.path().join(".gitattributes"), "*.env filter=git-cascade\n").unwrap();
    fs::write(temp.path().join("prod.env"), SECRET).unwrap();

    // Filters need the password too
    common::git_command(temp.path())
        .env(PASSWORD_ENV, "Sn0wman!")
        .args(["add", ".gitattributes", "prod.env"])
        .assert_success();

    let blob = stored_blob(temp.path(), ":prod.env");
    assert!(blob.starts_with(b"\0GCASCADE"));
}

#[test]
fn test_rotate_rewrites_committed_files() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    commit_secret(temp.path());
    let old_id = key_id(temp.path(), None);
    let old_blob = stored_blob(temp.path(), "HEAD:prod.env");

    git_cascade_cmd()
        .arg("rotate")
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Old key: {old_id}")))
        .stdout(predicate::str::contains("Re-encrypted 1 file(s)"));

    let new_id = key_id(temp.path(), None);
    assert_ne!(new_id, old_id);
    assert_eq!(backups(temp.path()), 1);

    git(temp.path(), &["commit", "-m", "Rotate key"]);
    let new_blob = stored_blob(temp.path(), "HEAD:prod.env");
    assert_ne!(new_blob, old_blob);
    assert_eq!(hex_key_id(&new_blob), new_id);

    // Fresh checkout decrypts with the new key
    fs::remove_file(temp.path().join("prod.env")).unwrap();
    git(temp.path(), &["checkout", "--", "prod.env"]);
    assert_eq!(fs::read(temp.path().join("prod.env")).unwrap(), SECRET);

    // Nothing left to convert
    git_cascade_cmd()
        .args(["rotate", "--resume"])
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Re-encrypted 0 file(s), 1 already current"));
}

#[test]
fn test_rotate_refuses_staged_changes_without_force() {
    let temp = create_git_repo();
    init_repo(temp.path(), None);
    commit_secret(temp.path());
    let old_id = key_id(temp.path(), None);

    fs::write(temp.path().join("prod.env"), b"CHANGED=1\n").unwrap();
    git(temp.path(), &["add", "prod.env"]);

    git_cascade_cmd()
        .arg("rotate")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("prod.env"))
        .stderr(predicate::str::contains("--force"));
    assert_eq!(key_id(temp.path(), None), old_id);

    git_cascade_cmd()
        .args(["rotate", "--force"])
        .current_dir(temp.path())
        .assert()
        .success();
    assert_ne!(key_id(temp.path(), None), old_id);
}

fn hex_key_id(blob: &[u8]) -> String {
    blob[10..18].iter().map(|b| format!("{b:02x}")).collect()
}

trait AssertSuccess {
    fn assert_success(&mut self);
}

impl AssertSuccess for std::process::Command {
    fn assert_success(&mut self) {
        let output = self.output().expect("failed to run command");
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use std::path::Path;
use std::process::{Command as StdCommand, Output};
use tempfile::TempDir;

/// Cheap Argon2id parameters so password flows stay fast.
pub const FAST_KDF_ENV: [(&str, &str); 3] = [
    ("GIT_CASCADE_KDF__MEMORY_KIB", "1024"),
    ("GIT_CASCADE_KDF__ITERATIONS", "1"),
    ("GIT_CASCADE_KDF__PARALLELISM", "1"),
];

#[allow(dead_code)]
pub const PASSWORD_ENV: &str = "GIT_CASCADE_PASSWORD";

/// Create a new temporary git repository with user config set.
pub fn create_git_repo() -> TempDir {
    let temp = TempDir::new().expect("failed to create temp dir");

    git(temp.path(), &["init"]);
    git(temp.path(), &["config", "user.email", "test@example.com"]);
    git(temp.path(), &["config", "user.name", "Test User"]);

    temp
}

/// Run git in `dir` with the fast KDF settings, panicking on failure.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> Output {
    let output = git_command(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// A git command in `dir` with the fast KDF settings and no password.
#[allow(dead_code)]
pub fn git_command(dir: &Path) -> StdCommand {
    let mut cmd = StdCommand::new("git");
    cmd.current_dir(dir).envs(FAST_KDF_ENV).env_remove(PASSWORD_ENV);
    cmd
}

/// Convenience helper for spawning the git-cascade binary via assert_cmd.
#[allow(dead_code)]
pub fn git_cascade_cmd() -> Command {
    let mut cmd = cargo_bin_cmd!("git-cascade");
    cmd.envs(FAST_KDF_ENV).env_remove(PASSWORD_ENV);
    cmd
}

/// Absolute path to the git-cascade test binary.
#[allow(dead_code)]
pub fn git_cascade_bin() -> &'static str {
    env!("CARGO_BIN_EXE_git-cascade")
}

/// `git-cascade init` in `dir`, optionally password-protected.
#[allow(dead_code)]
pub fn init_repo(dir: &Path, password: Option<&str>) {
    let mut cmd = git_cascade_cmd();
    cmd.arg("init").current_dir(dir);
    if let Some(password) = password {
        cmd.arg("--password").env(PASSWORD_ENV, password);
    }
    cmd.assert().success();
}

/// Key id as printed by `git-cascade status`.
#[allow(dead_code)]
pub fn key_id(dir: &Path, password: Option<&str>) -> String {
    let mut cmd = git_cascade_cmd();
    cmd.arg("status").current_dir(dir);
    if let Some(password) = password {
        cmd.env(PASSWORD_ENV, password);
    }
    let output = cmd.output().expect("failed to run status");
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Key id: "))
        .expect("status printed no key id")
        .trim()
        .to_string()
}

//! Layered settings.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `<config dir>/git-cascade/config.toml`
//! 3. `.git-cascade.toml` in the worktree root
//! 4. `GIT_CASCADE_<SECTION>__<KEY>` environment variables
//!
//! ```toml
//! [kdf]
//! memory_kib = 65536
//! iterations = 3
//! parallelism = 4
//!
//! [rekey]
//! batch_size = 64
//! jobs = 0
//! ```

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::error::{GitCascadeError, Result};
use crate::protect::KdfParams;
use crate::rekey::RotateOptions;

pub const REPO_CONFIG_FILE: &str = ".git-cascade.toml";
const ENV_PREFIX: &str = "GIT_CASCADE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Argon2id parameters for newly written protected records
    pub kdf: KdfParams,
    pub rekey: RekeySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RekeySettings {
    pub batch_size: usize,
    /// 0 lets rayon pick
    pub jobs: usize,
}

impl Default for RekeySettings {
    fn default() -> Self {
        let defaults = RotateOptions::default();
        Self {
            batch_size: defaults.batch_size,
            jobs: defaults.jobs,
        }
    }
}

impl Settings {
    /// Load settings for a worktree (or none, outside a repository).
    pub fn load(repo_root: Option<&Path>) -> Result<Self> {
        let user_file = user_config_path();
        Self::load_from(user_file.as_deref(), repo_root)
    }

    pub fn load_from(user_file: Option<&Path>, repo_root: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = user_file {
            debug!(path = %path.display(), "user config");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        if let Some(root) = repo_root {
            let path = root.join(REPO_CONFIG_FILE);
            debug!(path = %path.display(), "repository config");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|err| GitCascadeError::Config(format!("Failed to load settings: {err}")))?;

        if settings.rekey.batch_size == 0 {
            return Err(GitCascadeError::Config(
                "rekey.batch_size must be at least 1".into(),
            ));
        }
        Ok(settings)
    }

    pub fn rotate_options(&self, force: bool) -> RotateOptions {
        RotateOptions {
            force,
            batch_size: self.rekey.batch_size,
            jobs: self.rekey.jobs,
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("git-cascade").join("config.toml"))
}

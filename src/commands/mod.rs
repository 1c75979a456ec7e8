pub mod export_key;
pub mod filters;
pub mod init;
pub mod lock;
pub mod migrate;
pub mod password;
pub mod rotate;
pub mod status;
pub mod unlock;

pub use export_key::{export_key, import_key};
pub use filters::{clean, smudge};
pub use init::init;
pub use lock::lock;
pub use migrate::{migrate, MigrateTarget};
pub use rotate::rotate;
pub use status::status;
pub use unlock::unlock;

use git_cascade::{GitRepo, KeyStore, Result, Settings};

/// Repository, settings and key store for the current directory
pub struct Context {
    pub repo: GitRepo,
    pub settings: Settings,
    pub store: KeyStore,
}

impl Context {
    pub fn open() -> Result<Self> {
        let repo = GitRepo::open(".")?;
        let settings = Settings::load(repo.workdir().ok())?;
        let store = KeyStore::new(repo.git_dir()).with_kdf_params(settings.kdf);
        Ok(Self {
            repo,
            settings,
            store,
        })
    }
}

/// How git should invoke this binary from filter configuration
pub fn filter_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.to_str().map(str::to_string))
        .unwrap_or_else(|| "git-cascade".to_string())
}

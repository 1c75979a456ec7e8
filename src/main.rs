mod commands;

use clap::{Parser, Subcommand};
use commands::MigrateTarget;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter directive, e.g. `GIT_CASCADE_LOG=git_cascade=debug`
const LOG_ENV: &str = "GIT_CASCADE_LOG";

#[derive(Parser)]
#[command(name = "git-cascade")]
#[command(version)]
#[command(about = "Transparent post-quantum cascade encryption in git", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize git-cascade in the current repository
    Init {
        /// Store the key password-protected instead of in plaintext
        #[arg(short, long)]
        password: bool,
    },

    /// Show key storage and encrypted file status
    Status,

    /// Move the key between plaintext and password-protected storage
    Migrate {
        /// Storage mode to migrate to
        #[arg(long, value_enum)]
        to: MigrateTarget,
    },

    /// Rotate to a fresh keypair and re-encrypt tracked files
    Rotate {
        /// Rotate even if encrypted files have staged changes
        #[arg(short, long)]
        force: bool,

        /// Finish an interrupted rotation with the current key
        #[arg(long)]
        resume: bool,
    },

    /// Export the repository keypair, password-wrapped
    ExportKey {
        /// Output file path
        output: PathBuf,

        /// Write base64 text instead of binary
        #[arg(short, long)]
        armor: bool,
    },

    /// Import a keypair exported with export-key
    ImportKey {
        /// Input file path
        input: PathBuf,

        /// Replace an existing key (the old one is backed up)
        #[arg(short, long)]
        force: bool,

        /// Store the imported key in plaintext
        #[arg(long)]
        plaintext: bool,
    },

    /// Unlock the repository (decrypt files)
    Unlock,

    /// Lock the repository (show encrypted content)
    Lock,

    /// Clean filter (used internally by git)
    Clean {
        /// Path of the file being filtered
        #[arg(default_value = "")]
        path: String,
    },

    /// Smudge filter (used internally by git)
    Smudge {
        /// Path of the file being filtered
        #[arg(default_value = "")]
        path: String,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { password } => commands::init(password)?,
        Commands::Status => commands::status()?,
        Commands::Migrate { to } => commands::migrate(to)?,
        Commands::Rotate { force, resume } => commands::rotate(force, resume)?,
        Commands::ExportKey { output, armor } => commands::export_key(&output, armor)?,
        Commands::ImportKey {
            input,
            force,
            plaintext,
        } => commands::import_key(&input, force, plaintext)?,
        Commands::Unlock => commands::unlock()?,
        Commands::Lock => commands::lock()?,
        Commands::Clean { path } => commands::clean(&path)?,
        Commands::Smudge { path } => commands::smudge(&path)?,
    }

    Ok(())
}

// Stdout carries filter data, so logs go to stderr
fn init_logging() -> anyhow::Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) => EnvFilter::try_new(&directives)
            .map_err(|e| anyhow::anyhow!("invalid {LOG_ENV} value '{directives}': {e}"))?,
        Err(_) => EnvFilter::new("warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

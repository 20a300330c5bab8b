//! # driftpad
//!
//! Command-line client for driftpad pads.
//!
//! ## Commands
//!
//! - `create`: Mint a new pad and sign in on this device
//! - `import`: Sign in with an existing secret key, signing out other devices
//! - `show`: Print a pad's text (no key needed)
//! - `edit`: Edit a pad interactively over stdin
//! - `logout`: Sign out on this device
//! - `status`: Show session and relay-cache state
//!
//! ## Example
//!
//! ```bash
//! # Mint a pad; note the pad id and secret key it prints
//! driftpad create
//!
//! # Edit it: every line you type replaces the pad text
//! driftpad edit <pad-id>
//!
//! # Anyone with the pad id can read it
//! driftpad show <pad-id>
//!
//! # Move write access to another device
//! driftpad import <pad-id>
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use pad_types::PadId;

mod commands;
mod context;

use commands::{create, edit, import, logout, show, status};
use context::CliContext;

/// Command-line client for driftpad pads.
#[derive(Parser, Debug)]
#[command(name = "driftpad")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the session vault and relay cache
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Bootstrap relay URL (repeatable; replaces the built-in set)
    #[arg(long = "relay", global = true)]
    relays: Vec<String>,

    /// Run against an in-process relay network instead of real sockets
    #[arg(long, global = true)]
    mock: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mint a new pad and sign in on this device
    Create,

    /// Sign in with an existing secret key, signing out other devices
    Import {
        /// Expected pad id; the key must derive exactly this pad
        #[arg(value_parser = pad_id_arg)]
        pad_id: Option<PadId>,

        /// Secret key as 64 hex characters (prompted hidden when omitted)
        #[arg(long)]
        key: Option<String>,
    },

    /// Print a pad's text once it converges
    Show {
        /// The pad to read
        #[arg(value_parser = pad_id_arg)]
        pad_id: PadId,

        /// Keep printing updates until interrupted
        #[arg(long)]
        follow: bool,
    },

    /// Edit a pad over stdin; each line replaces the pad text
    Edit {
        /// The pad to edit; the stored session key must match
        #[arg(value_parser = pad_id_arg)]
        pad_id: PadId,
    },

    /// Sign out on this device
    Logout,

    /// Show session and relay-cache state
    Status,
}

fn pad_id_arg(s: &str) -> Result<PadId, String> {
    PadId::parse(s).map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let ctx = CliContext::new(data_dir, cli.relays, cli.mock);

    match cli.command {
        Commands::Create => create::run(&ctx).await,
        Commands::Import { pad_id, key } => import::run(&ctx, pad_id, key).await,
        Commands::Show { pad_id, follow } => show::run(&ctx, pad_id, follow).await,
        Commands::Edit { pad_id } => edit::run(&ctx, pad_id).await,
        Commands::Logout => logout::run(&ctx).await,
        Commands::Status => status::run(&ctx).await,
    }
}

/// Wire `-v` flags and `RUST_LOG` into the subscriber. Logs go to stderr so
/// pad text on stdout stays clean.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for driftpad.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "driftpad", "driftpad")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

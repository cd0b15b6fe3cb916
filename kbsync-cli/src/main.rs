//! kbsync: keep a remote knowledge base in step with local manifests.
//!
//! # Usage
//!
//! ```text
//! kbsync sync [--dry-run] [--force] [--json] [--manifest <path>]...
//! kbsync sync --watch [--interval <secs>]
//! kbsync serve [--bind <addr>] [--watch] [--interval <secs>]
//! kbsync plan [--force] [--json] [--manifest <path>]...
//! kbsync remote list [--json]
//! ```
//!
//! Settings come from `KBSYNC_*` environment variables (a `.env` file is
//! honoured); the global flags below override them.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use commands::{plan::PlanArgs, remote::RemoteCommand, serve::ServeArgs, sync::SyncArgs};
use kbsync_core::SyncConfig;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "kbsync",
    version,
    about = "Synchronize local documentation into a knowledge base",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one synchronization pass (or keep running with --watch).
    Sync(SyncArgs),

    /// Serve the HTTP trigger endpoint, optionally with the watch loop.
    Serve(ServeArgs),

    /// Show what a sync would do. Needs no credentials.
    Plan(PlanArgs),

    /// Inspect the remote knowledge base.
    Remote {
        #[command(subcommand)]
        command: RemoteCommand,
    },
}

/// Overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Directory holding manifest files and config.md.
    #[arg(long, global = true, value_name = "DIR")]
    pub definitions: Option<PathBuf>,

    /// Cache file location.
    #[arg(long, global = true, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Knowledge base base URL.
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Environment first, then flags.
    pub fn load_config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::from_env().context("invalid configuration")?;
        if let Some(dir) = &self.definitions {
            config.definitions_dir = dir.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_file = cache.clone();
        }
        if let Some(url) = &self.url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    kbsync_daemon::init_tracing(cli.global.log_json);

    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Serve(args) => args.run(&cli.global),
        Commands::Plan(args) => args.run(&cli.global),
        Commands::Remote { command } => commands::remote::run(command, &cli.global),
    }
}

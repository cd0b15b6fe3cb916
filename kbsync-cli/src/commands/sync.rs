//! `kbsync sync`: one synchronization pass, or a watch loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::broadcast;

use kbsync_sync::{Coordinator, RunOptions, RunOutcome, RunResult, RunStatus};

use crate::GlobalArgs;

/// Arguments for `kbsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Report what would change without calling the remote or writing the cache.
    #[arg(long, conflicts_with = "watch")]
    pub dry_run: bool,

    /// Re-upload every resolved file regardless of the cache.
    #[arg(long, conflicts_with = "watch")]
    pub force: bool,

    /// Keep running, syncing every `--interval` seconds until ctrl-c.
    #[arg(long)]
    pub watch: bool,

    /// Watch interval in seconds.
    #[arg(long, value_name = "SECS", requires = "watch")]
    pub interval: Option<u64>,

    /// Print the run result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Extra manifest file, in addition to the definitions directory.
    #[arg(long = "manifest", value_name = "PATH")]
    pub manifests: Vec<PathBuf>,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut config = global.load_config()?;
        config.extra_manifests.extend(self.manifests.iter().cloned());
        if let Some(secs) = self.interval {
            config.watch_interval = Duration::from_secs(secs.max(1));
        }
        let interval = config.watch_interval;
        let coordinator = Coordinator::from_config(config).context("cannot start sync")?;
        let runtime = kbsync_daemon::runtime()?;

        if self.watch {
            return runtime.block_on(watch_until_ctrl_c(coordinator, interval));
        }

        let options = RunOptions {
            dry_run: self.dry_run,
            force: self.force,
        };
        let RunOutcome::Completed(result) = runtime.block_on(coordinator.try_run(options)) else {
            bail!("a sync run is already in progress");
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&result);
        }

        match result.status {
            RunStatus::Success => Ok(()),
            RunStatus::PartialFailure => bail!("{} file(s) failed to sync", result.failures.len()),
            RunStatus::Aborted => bail!(
                "sync aborted: {}",
                result
                    .failures
                    .last()
                    .map(|f| f.error.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}

async fn watch_until_ctrl_c(coordinator: Coordinator, interval: Duration) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let watcher = tokio::spawn(kbsync_daemon::watch_task(
        coordinator.clone(),
        interval,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("ctrl-c handler failed")?;
    tracing::info!("received ctrl-c, stopping after the current run");
    let _ = shutdown_tx.send(());
    watcher.await.context("watch loop failed")?;
    coordinator.wait_idle().await;
    Ok(())
}

fn print_result(result: &RunResult) {
    let prefix = if result.dry_run { "[dry-run] " } else { "" };
    let mark = match result.status {
        RunStatus::Success => "✓".green(),
        RunStatus::PartialFailure => "!".yellow(),
        RunStatus::Aborted => "✗".red(),
    };
    println!(
        "{prefix}{mark} {} created, {} updated, {} deleted, {} unchanged ({} ms)",
        result.created, result.updated, result.deleted, result.unchanged, result.duration_ms,
    );
    for failure in &result.failures {
        println!(
            "  {} {:?} {}: {}",
            "✗".red(),
            failure.operation,
            failure.path.display(),
            failure.error
        );
    }
    for warning in &result.warnings {
        println!("  {} {warning}", "warning:".yellow());
    }
}

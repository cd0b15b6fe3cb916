//! `kbsync serve`: HTTP trigger endpoint plus optional watch loop.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use kbsync_daemon::{start_blocking, ServeOptions};
use kbsync_sync::Coordinator;

use crate::GlobalArgs;

/// Arguments for `kbsync serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (defaults to KBSYNC_BIND, then 0.0.0.0:8766).
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Also sync on a fixed interval.
    #[arg(long)]
    pub watch: bool,

    /// Watch interval in seconds.
    #[arg(long, value_name = "SECS", requires = "watch")]
    pub interval: Option<u64>,
}

impl ServeArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut config = global.load_config()?;
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(secs) = self.interval {
            config.watch_interval = Duration::from_secs(secs.max(1));
        }
        let options = ServeOptions {
            bind: config.bind.clone(),
            watch: self.watch.then_some(config.watch_interval),
        };
        let coordinator = Coordinator::from_config(config).context("cannot start service")?;
        start_blocking(coordinator, options).context("service exited with error")?;
        Ok(())
    }
}

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use kbsync_sync::{Coordinator, RunOptions, RunOutcome};

use crate::error::DaemonError;
use crate::server::router;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub bind: String,
    /// Interval of the watch loop; `None` serves HTTP triggers only.
    pub watch: Option<Duration>,
}

/// Multi-threaded runtime used by every blocking entry point of the CLI.
pub fn runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)
}

/// Start the service and block the current thread until it exits.
pub fn start_blocking(coordinator: Coordinator, options: ServeOptions) -> Result<(), DaemonError> {
    runtime()?.block_on(serve(coordinator, options))
}

/// Bind, serve, and stop on ctrl-c.
pub async fn serve(coordinator: Coordinator, options: ServeOptions) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(&options.bind)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: options.bind.clone(),
            source,
        })?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Signal(err)),
                    }
                }
            }
        })
    };

    let served = run_until(listener, coordinator, options.watch, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    served
}

/// Run the HTTP server (and the watch loop, if enabled) on `listener` until
/// `shutdown` fires. Returns once any in-flight sync run has finished.
pub async fn run_until(
    listener: TcpListener,
    coordinator: Coordinator,
    watch: Option<Duration>,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, watch_secs = watch.map(|w| w.as_secs()), "kbsync service listening");
    }

    let server_handle = {
        let shutdown = shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let app = router(coordinator.clone());
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(DaemonError::Serve);
            let _ = shutdown.send(());
            result
        })
    };

    let watch_handle = watch.map(|interval| {
        let shutdown_rx = shutdown.subscribe();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            watch_task(coordinator, interval, shutdown_rx).await;
            Ok::<(), DaemonError>(())
        })
    });

    let server_result = server_handle.await;
    if let Some(handle) = watch_handle {
        handle_join("watch", handle.await)?;
    }
    handle_join("http_server", server_result)?;

    if coordinator.is_running() {
        tracing::info!("waiting for in-flight sync run to finish");
    }
    coordinator.wait_idle().await;
    tracing::info!("kbsync service stopped");
    Ok(())
}

/// Trigger a run every `interval`, starting immediately. A tick that finds a
/// run in progress is skipped.
pub async fn watch_task(
    coordinator: Coordinator,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                match coordinator.try_run(RunOptions::default()).await {
                    RunOutcome::Completed(result) => tracing::debug!(
                        status = ?result.status,
                        "watch run complete",
                    ),
                    RunOutcome::AlreadyRunning => {
                        tracing::info!("watch tick skipped, sync already running");
                    }
                }
            }
        }
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

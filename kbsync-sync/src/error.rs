//! Error types for kbsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use kbsync_client::ClientError;
use kbsync_core::ConfigError;

/// Errors that stop a run (as opposed to per-file failures, which are
/// recorded in the run result).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("remote error: {0}")]
    Client(#[from] ClientError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },

    #[error("concurrency limiter closed")]
    LimiterClosed,

    /// JSON serialization error (cache store).
    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for kbsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration errors. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable / flag was not provided.
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    /// A setting was present but could not be parsed.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.kbsync/`.
    #[error("cannot determine home directory; set $HOME or KBSYNC_DEFINITIONS_DIR")]
    HomeNotFound,

    /// An exclude pattern in `config.md` is not a valid glob.
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// I/O failure while reading a settings file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            name,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

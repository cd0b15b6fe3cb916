//! kbsync core library: domain types, configuration, errors.
//!
//! - [`types`]: newtypes and domain structs shared by every crate
//! - [`config`]: [`SyncConfig`] and the prefix-rewrite table
//! - [`settings`]: per-definitions-dir `config.md` (extensions, excludes)
//! - [`paths`]: default locations under `~/.kbsync/`
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod settings;
pub mod types;

pub use config::{PrefixMap, PrefixRule, SyncConfig};
pub use error::ConfigError;
pub use settings::{DefinitionSettings, FileFilter};
pub use types::{CacheEntry, DocumentId, Fingerprint, ManifestEntry, ResolvedFile};

//! Cache store: last-known synchronized state, one JSON document on disk.
//!
//! Writes use the atomic `.tmp` + rename pattern so a crash mid-write never
//! leaves a half-written cache. Loads never fail: a missing file is an empty
//! cache, a malformed or unreadable one is an empty cache plus a warning
//! (which forces an effective full resync).

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kbsync_core::CacheEntry;

use crate::error::{io_err, SyncError};

pub const CACHE_VERSION: u32 = 1;

/// In-memory cache: cache key (resolved path) → entry.
pub type CacheMap = BTreeMap<String, CacheEntry>;

/// On-disk cache payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: CacheMap,
}

/// Result of [`CacheStore::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedCache {
    pub entries: CacheMap,
    /// Set when an existing cache file had to be discarded.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub fn load(&self) -> LoadedCache {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return LoadedCache::default(),
            Err(err) => return self.discard(format!("cannot read cache: {err}")),
        };
        match serde_json::from_str::<CacheFile>(&contents) {
            Ok(file) if file.version == CACHE_VERSION => LoadedCache {
                entries: file.entries,
                warning: None,
            },
            Ok(file) => self.discard(format!("unsupported cache version {}", file.version)),
            Err(err) => self.discard(format!("malformed cache: {err}")),
        }
    }

    fn discard(&self, reason: String) -> LoadedCache {
        tracing::warn!(
            path = %self.path.display(),
            %reason,
            "discarding sync cache, next run resyncs everything",
        );
        LoadedCache {
            entries: CacheMap::new(),
            warning: Some(format!("{}: {reason}", self.path.display())),
        }
    }

    /// Persist the full mapping atomically: write `<path>.tmp`, then rename.
    pub fn save(&self, entries: &CacheMap) -> Result<(), SyncError> {
        self.ensure_parent()?;
        let file = CacheFile {
            version: CACHE_VERSION,
            saved_at: Utc::now(),
            entries: entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(err) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, err));
        }
        tracing::debug!(path = %self.path.display(), entries = entries.len(), "cache saved");
        Ok(())
    }

    /// Startup check: the cache location must be creatable and writable.
    pub fn check_writable(&self) -> Result<(), SyncError> {
        self.ensure_parent()?;
        let scratch = self.tmp_path();
        std::fs::write(&scratch, b"").map_err(|e| io_err(&scratch, e))?;
        std::fs::remove_file(&scratch).map_err(|e| io_err(&scratch, e))?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<(), SyncError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
            }
            _ => Ok(()),
        }
    }
}

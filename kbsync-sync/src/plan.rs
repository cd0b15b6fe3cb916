//! Change detection: diff resolved files against the cache.
//!
//! Classification is per path and by content hash plus target collection;
//! mtime and size are never consulted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use kbsync_core::{CacheEntry, DocumentId, Fingerprint, ResolvedFile};

use crate::cache_store::CacheMap;

/// SHA-256 of `bytes`, lowercase hex.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(hex::encode(hasher.finalize()))
}

pub fn fingerprint_file(path: &Path) -> std::io::Result<Fingerprint> {
    std::fs::read(path).map(|bytes| fingerprint_bytes(&bytes))
}

/// A resolved file plus its current fingerprint (`None` if unreadable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFile {
    pub file: ResolvedFile,
    pub fingerprint: Option<Fingerprint>,
}

/// Fingerprint every resolved file. Read failures are carried forward so the
/// executor can report them per file.
pub fn observe(files: Vec<ResolvedFile>) -> Vec<ObservedFile> {
    files
        .into_iter()
        .map(|file| {
            let fingerprint = match fingerprint_file(&file.path) {
                Ok(fp) => Some(fp),
                Err(err) => {
                    tracing::warn!(path = %file.path.display(), error = %err, "cannot fingerprint file");
                    None
                }
            };
            ObservedFile { file, fingerprint }
        })
        .collect()
}

/// A file that needs an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub file: ResolvedFile,
    pub fingerprint: Option<Fingerprint>,
    /// Document id from the cache, if the path was synced before.
    pub previous: Option<DocumentId>,
}

/// A cached path that no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub key: String,
    pub entry: CacheEntry,
}

impl PlannedDelete {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.key)
    }
}

/// Four disjoint buckets for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub create: Vec<PlannedWrite>,
    pub update: Vec<PlannedWrite>,
    pub delete: Vec<PlannedDelete>,
    pub unchanged: Vec<ResolvedFile>,
}

/// Bucket sizes, the serializable face of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            create: self.create.len(),
            update: self.update.len(),
            delete: self.delete.len(),
            unchanged: self.unchanged.len(),
        }
    }

    /// True when the plan needs no remote call.
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions<'a> {
    /// Force full resync: every resolved file goes to `update`.
    pub force: bool,
    /// Ids present remotely. Cached entries whose id is missing are
    /// treated as uncached.
    pub remote_ids: Option<&'a HashSet<DocumentId>>,
}

/// Classify observed files against the cache.
pub fn diff(observed: Vec<ObservedFile>, cache: &CacheMap, options: DiffOptions<'_>) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut live: HashSet<String> = HashSet::with_capacity(observed.len());

    for ObservedFile { file, fingerprint } in observed {
        let key = file.cache_key();
        live.insert(key.clone());

        let cached = cache.get(&key).filter(|entry| match options.remote_ids {
            Some(ids) => ids.contains(&entry.document_id),
            None => true,
        });

        if options.force {
            plan.update.push(PlannedWrite {
                file,
                fingerprint,
                previous: cached.map(|e| e.document_id.clone()),
            });
            continue;
        }

        match cached {
            None => plan.create.push(PlannedWrite {
                file,
                fingerprint,
                previous: None,
            }),
            Some(entry)
                if fingerprint.as_ref() == Some(&entry.fingerprint)
                    && entry.collection.as_deref() == file.collection() =>
            {
                plan.unchanged.push(file);
            }
            Some(entry) => plan.update.push(PlannedWrite {
                file,
                fingerprint,
                previous: Some(entry.document_id.clone()),
            }),
        }
    }

    for (key, entry) in cache {
        if live.contains(key) {
            continue;
        }
        plan.delete.push(PlannedDelete {
            key: key.clone(),
            entry: entry.clone(),
        });
    }

    plan
}

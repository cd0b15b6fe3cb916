//! Domain types for kbsync.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Cache keys are the lossy string form of a [`ResolvedFile`] path.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier the remote knowledge base assigned to a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Lowercase hex SHA-256 of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Manifest + resolution
// ---------------------------------------------------------------------------

/// One non-comment line of a manifest, after prefix translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The line exactly as written (trimmed).
    pub raw: String,
    /// Path after the prefix-rewrite table was applied.
    pub path: PathBuf,
    /// The line ended with a path separator.
    pub is_dir_hint: bool,
    /// Manifest the entry came from (file stem, or a caller-supplied label).
    pub manifest: String,
    /// 1-based line number inside the manifest.
    pub line: usize,
}

/// A concrete file on disk selected for synchronization.
///
/// `path` is canonical: symlinks resolved, absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// First manifest that referenced the file.
    pub manifest: String,
}

impl ResolvedFile {
    pub fn new(path: impl Into<PathBuf>, manifest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            manifest: manifest.into(),
        }
    }

    /// Remote collection the file belongs to: its manifest, if named.
    pub fn collection(&self) -> Option<&str> {
        Some(self.manifest.as_str()).filter(|m| !m.is_empty())
    }

    /// Key used in the cache store.
    pub fn cache_key(&self) -> String {
        cache_key(&self.path)
    }
}

/// Cache key for an arbitrary path.
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Last-known synchronized state of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub document_id: DocumentId,
    /// Collection the document was uploaded into; `None` for the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub synced_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

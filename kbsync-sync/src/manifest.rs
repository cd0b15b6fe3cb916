//! Manifest resolution: manifest text to a deduplicated list of real files.
//!
//! Resolution steps per line:
//! 1. Skip blank lines and `#` comments.
//! 2. Rewrite the path through the [`PrefixMap`] (first match wins).
//! 3. Stat: directories expand via [`expand_dir`], files pass the filter.
//! 4. Canonicalize (resolves symlinks) and dedup on the real path.
//!
//! Anything that resolves to nothing becomes a [`ResolutionWarning`]; the
//! rest of the manifest still resolves.

use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kbsync_core::{
    paths::CONFIG_FILE, settings::Rejection, FileFilter, ManifestEntry, PrefixMap, ResolvedFile,
};

use crate::error::{io_err, SyncError};
use crate::expand::expand_dir;

/// Where manifest text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    File(PathBuf),
    Inline { name: String, text: String },
}

impl ManifestSource {
    pub fn name(&self) -> String {
        match self {
            ManifestSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ManifestSource::Inline { name, .. } => name.clone(),
        }
    }
}

/// A manifest line (or manifest) that contributed no files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionWarning {
    pub manifest: String,
    pub line: Option<usize>,
    pub entry: String,
    pub reason: String,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "{}:{}: {} ({})",
                self.manifest, line, self.entry, self.reason
            ),
            None => write!(f, "{}: {} ({})", self.manifest, self.entry, self.reason),
        }
    }
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub files: Vec<ResolvedFile>,
    pub warnings: Vec<ResolutionWarning>,
}

/// Every `*.md` directly inside `definitions`, except `config.md`, sorted.
///
/// A missing definitions directory is an error: resolving it to an empty
/// set would plan a delete for every cached document.
pub fn discover_manifests(definitions: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let entries = std::fs::read_dir(definitions).map_err(|e| io_err(definitions, e))?;
    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("md"))
                .unwrap_or(false)
        })
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| !n.eq_ignore_ascii_case(CONFIG_FILE))
                .unwrap_or(true)
        })
        .collect();
    manifests.sort();
    Ok(manifests)
}

/// Parse manifest text into entries. Paths are translated but not touched
/// on disk.
pub fn parse_manifest(name: &str, text: &str, prefix_map: &PrefixMap) -> Vec<ManifestEntry> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let raw = line.trim();
            if raw.is_empty() || raw.starts_with('#') {
                return None;
            }
            let is_dir_hint = raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR);
            Some(ManifestEntry {
                raw: raw.to_string(),
                path: prefix_map.translate(Path::new(raw)),
                is_dir_hint,
                manifest: name.to_string(),
                line: idx + 1,
            })
        })
        .collect()
}

/// Resolve every source into one deduplicated, first-seen-ordered file list.
pub fn resolve(sources: &[ManifestSource], prefix_map: &PrefixMap, filter: &FileFilter) -> Resolution {
    let mut resolver = Resolver::new(filter);
    for source in sources {
        let name = source.name();
        let text = match source {
            ManifestSource::Inline { text, .. } => text.clone(),
            ManifestSource::File(path) => match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    resolver.warn_manifest(&name, path, err.to_string());
                    continue;
                }
            },
        };
        for entry in parse_manifest(&name, &text, prefix_map) {
            resolver.resolve_entry(&entry);
        }
    }
    tracing::debug!(
        files = resolver.out.files.len(),
        warnings = resolver.out.warnings.len(),
        "manifests resolved",
    );
    resolver.out
}

struct Resolver<'a> {
    filter: &'a FileFilter,
    seen: HashSet<PathBuf>,
    out: Resolution,
}

impl<'a> Resolver<'a> {
    fn new(filter: &'a FileFilter) -> Self {
        Self {
            filter,
            seen: HashSet::new(),
            out: Resolution::default(),
        }
    }

    fn resolve_entry(&mut self, entry: &ManifestEntry) {
        let meta = match std::fs::metadata(&entry.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.warn(entry, format!("path does not exist: {}", entry.path.display()));
                return;
            }
            Err(err) => {
                self.warn(entry, format!("cannot stat {}: {err}", entry.path.display()));
                return;
            }
        };

        if meta.is_dir() {
            let files = expand_dir(&entry.path, self.filter);
            if files.is_empty() {
                tracing::debug!(entry = %entry.raw, "directory entry contains no matching files");
            }
            for file in files {
                self.push(entry, &file);
            }
            return;
        }

        match self.filter.check(&entry.path) {
            None => self.push(entry, &entry.path),
            Some(Rejection::Extension) => self.warn(entry, "unsupported file type".to_string()),
            Some(Rejection::Excluded) => self.warn(entry, "excluded by pattern".to_string()),
        }
    }

    fn push(&mut self, entry: &ManifestEntry, path: &Path) {
        let real = match std::fs::canonicalize(path) {
            Ok(real) => real,
            Err(err) => {
                self.warn(entry, format!("cannot resolve {}: {err}", path.display()));
                return;
            }
        };
        if self.seen.insert(real.clone()) {
            self.out
                .files
                .push(ResolvedFile::new(real, entry.manifest.clone()));
        }
    }

    fn warn(&mut self, entry: &ManifestEntry, reason: String) {
        tracing::warn!(
            manifest = %entry.manifest,
            line = entry.line,
            entry = %entry.raw,
            %reason,
            "manifest entry resolved to nothing",
        );
        self.out.warnings.push(ResolutionWarning {
            manifest: entry.manifest.clone(),
            line: Some(entry.line),
            entry: entry.raw.clone(),
            reason,
        });
    }

    fn warn_manifest(&mut self, name: &str, path: &Path, reason: String) {
        tracing::warn!(manifest = %path.display(), %reason, "cannot read manifest");
        self.out.warnings.push(ResolutionWarning {
            manifest: name.to_string(),
            line: None,
            entry: path.display().to_string(),
            reason,
        });
    }
}

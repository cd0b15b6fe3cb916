//! Definitions-directory settings (`config.md`).
//!
//! ```text
//! ## Extensions
//! .md
//! .txt
//!
//! ## Exclude
//! **/node_modules/**
//! ```
//!
//! Lines before the first section, other headings, and blank lines are
//! ignored. An empty section falls back to its default.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::ConfigError;
use crate::paths::settings_path;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".md", ".txt", ".rst", ".yaml", ".yml", ".json"];
pub const DEFAULT_EXCLUDES: &[&str] = &["**/node_modules/**", "**/.git/**", "**/__pycache__/**"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Extensions,
    Excludes,
}

/// Parsed `config.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionSettings {
    /// Lowercase, dot-prefixed extensions (`.md`).
    pub extensions: BTreeSet<String>,
    pub excludes: Vec<String>,
}

impl Default for DefinitionSettings {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            excludes: DEFAULT_EXCLUDES.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl DefinitionSettings {
    pub fn parse(content: &str) -> Self {
        let mut extensions = BTreeSet::new();
        let mut excludes = Vec::new();
        let mut section = None;

        for line in content.lines().map(str::trim) {
            if line.starts_with("## Extensions") {
                section = Some(Section::Extensions);
            } else if line.starts_with("## Exclude") {
                section = Some(Section::Excludes);
            } else if line.is_empty() || line.starts_with('#') {
                continue;
            } else {
                match section {
                    Some(Section::Extensions) if line.starts_with('.') => {
                        extensions.insert(line.to_ascii_lowercase());
                    }
                    Some(Section::Excludes) => excludes.push(line.to_string()),
                    _ => {}
                }
            }
        }

        let defaults = Self::default();
        Self {
            extensions: if extensions.is_empty() {
                defaults.extensions
            } else {
                extensions
            },
            excludes: if excludes.is_empty() {
                defaults.excludes
            } else {
                excludes
            },
        }
    }

    /// Load `<definitions>/config.md`, falling back to defaults when absent.
    pub fn load_at(definitions: &Path) -> Result<Self, ConfigError> {
        let path = settings_path(definitions);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn filter(&self) -> Result<FileFilter, ConfigError> {
        FileFilter::new(self)
    }
}

/// Why a file was rejected by [`FileFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Extension,
    Excluded,
}

/// Compiled extension + exclude-glob filter.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: BTreeSet<String>,
    excludes: GlobSet,
}

impl FileFilter {
    pub fn new(settings: &DefinitionSettings) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &settings.excludes {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let excludes = builder.build().map_err(|source| ConfigError::Glob {
            pattern: settings.excludes.join(", "),
            source,
        })?;
        Ok(Self {
            extensions: settings.extensions.clone(),
            excludes,
        })
    }

    /// `None` if the file is accepted.
    pub fn check(&self, path: &Path) -> Option<Rejection> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()));
        match ext {
            Some(ext) if self.extensions.contains(&ext) => {}
            _ => return Some(Rejection::Extension),
        }
        if self.excludes.is_match(path) {
            return Some(Rejection::Excluded);
        }
        None
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.check(path).is_none()
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            extensions: DefinitionSettings::default().extensions,
            excludes: default_excludes(),
        }
    }
}

fn default_excludes() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

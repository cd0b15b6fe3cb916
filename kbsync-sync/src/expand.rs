//! Directory expansion for manifest directory entries.
//!
//! Pure with respect to configuration: takes an already-translated root and a
//! filter, returns a flat, sorted file list. Prefix rewriting happens in
//! [`crate::manifest`].

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use kbsync_core::FileFilter;

/// Recursively list files under `root` accepted by `filter`.
///
/// Symlinks are followed (walkdir detects loops). Entries that cannot be
/// read are skipped with a debug log; files the filter rejects are skipped
/// silently.
pub fn expand_dir(root: &Path, filter: &FileFilter) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if filter.accepts(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files
}

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.md";
pub const CACHE_FILE: &str = "cache.json";
pub const DEFAULT_URL: &str = "http://localhost:8080";
pub const DEFAULT_BIND: &str = "0.0.0.0:8766";
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);

pub fn kbsync_root(home: &Path) -> PathBuf {
    home.join(".kbsync")
}

pub fn definitions_dir(home: &Path) -> PathBuf {
    kbsync_root(home).join("knowledge")
}

pub fn cache_path(home: &Path) -> PathBuf {
    kbsync_root(home).join(CACHE_FILE)
}

/// `config.md` inside a definitions directory.
pub fn settings_path(definitions: &Path) -> PathBuf {
    definitions.join(CONFIG_FILE)
}

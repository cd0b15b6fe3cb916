//! Runtime configuration.
//!
//! Values come from `KBSYNC_*` environment variables; the CLI overrides
//! individual fields after loading. Every loader has two forms, mirroring the
//! rest of the workspace:
//! - `from_lookup(home, lookup)`: explicit home + variable source; used in tests
//! - `from_env()`: derives home from `dirs::home_dir()` and reads the process env

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::paths;

pub const ENV_URL: &str = "KBSYNC_URL";
pub const ENV_API_KEY: &str = "KBSYNC_API_KEY";
pub const ENV_DEFINITIONS_DIR: &str = "KBSYNC_DEFINITIONS_DIR";
pub const ENV_CACHE_FILE: &str = "KBSYNC_CACHE_FILE";
pub const ENV_PREFIX_MAP: &str = "KBSYNC_PREFIX_MAP";
pub const ENV_COLLECTION: &str = "KBSYNC_COLLECTION";
pub const ENV_CONCURRENCY: &str = "KBSYNC_CONCURRENCY";
pub const ENV_MAX_RETRIES: &str = "KBSYNC_MAX_RETRIES";
pub const ENV_RETRY_BASE_MS: &str = "KBSYNC_RETRY_BASE_MS";
pub const ENV_TIMEOUT_SECS: &str = "KBSYNC_TIMEOUT_SECS";
pub const ENV_BIND: &str = "KBSYNC_BIND";
pub const ENV_WATCH_INTERVAL_SECS: &str = "KBSYNC_WATCH_INTERVAL_SECS";
pub const ENV_RECONCILE: &str = "KBSYNC_RECONCILE";

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Prefix rewrite table
// ---------------------------------------------------------------------------

/// One `{virtual, real}` pair of the prefix-rewrite table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub virtual_prefix: PathBuf,
    pub real_prefix: PathBuf,
}

impl PrefixRule {
    pub fn new(virtual_prefix: impl Into<PathBuf>, real_prefix: impl Into<PathBuf>) -> Self {
        Self {
            virtual_prefix: virtual_prefix.into(),
            real_prefix: real_prefix.into(),
        }
    }
}

/// Ordered prefix-rewrite table. The first matching virtual prefix wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrefixMap {
    rules: Vec<PrefixRule>,
}

impl PrefixMap {
    pub fn new(rules: Vec<PrefixRule>) -> Self {
        Self { rules }
    }

    /// Parse `virtual=real` pairs separated by `;` or newlines.
    ///
    /// A single `virtual:real` pair (no `=` anywhere) is also accepted.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();
        for pair in spec
            .split([';', '\n'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let split = pair.split_once('=').or_else(|| pair.split_once(':'));
            let Some((virtual_prefix, real_prefix)) = split else {
                return Err(ConfigError::invalid(
                    ENV_PREFIX_MAP,
                    pair,
                    "expected virtual=real",
                ));
            };
            let (virtual_prefix, real_prefix) = (virtual_prefix.trim(), real_prefix.trim());
            if virtual_prefix.is_empty() || real_prefix.is_empty() {
                return Err(ConfigError::invalid(
                    ENV_PREFIX_MAP,
                    pair,
                    "prefixes must not be empty",
                ));
            }
            rules.push(PrefixRule::new(virtual_prefix, real_prefix));
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PrefixRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite `path` with the first rule whose virtual prefix matches.
    ///
    /// Matching is component-wise, so `/kb` does not match `/kbase/a.md`.
    /// Paths with no matching rule are returned unchanged.
    pub fn translate(&self, path: &Path) -> PathBuf {
        for rule in &self.rules {
            if let Ok(rest) = path.strip_prefix(&rule.virtual_prefix) {
                if rest.as_os_str().is_empty() {
                    return rule.real_prefix.clone();
                }
                return rule.real_prefix.join(rest);
            }
        }
        path.to_path_buf()
    }

    /// Real roots, used to derive document titles relative to the mount.
    pub fn real_roots(&self) -> impl Iterator<Item = &Path> {
        self.rules.iter().map(|r| r.real_prefix.as_path())
    }
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Everything a run, the webhook server, and the CLI need to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub definitions_dir: PathBuf,
    /// Manifests given explicitly, in addition to `*.md` in `definitions_dir`.
    pub extra_manifests: Vec<PathBuf>,
    pub cache_file: PathBuf,
    pub prefix_map: PrefixMap,
    pub collection: Option<String>,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub request_timeout: Duration,
    pub bind: String,
    pub watch_interval: Duration,
    pub reconcile: bool,
}

impl SyncConfig {
    /// Defaults rooted at `home`, no environment applied.
    pub fn defaults_at(home: &Path) -> Self {
        Self {
            base_url: paths::DEFAULT_URL.to_string(),
            api_key: None,
            definitions_dir: paths::definitions_dir(home),
            extra_manifests: Vec::new(),
            cache_file: paths::cache_path(home),
            prefix_map: PrefixMap::default(),
            collection: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            request_timeout: DEFAULT_TIMEOUT,
            bind: paths::DEFAULT_BIND.to_string(),
            watch_interval: paths::DEFAULT_WATCH_INTERVAL,
            reconcile: false,
        }
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(home: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::defaults_at(home);

        if let Some(url) = var(ENV_URL) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        config.api_key = var(ENV_API_KEY).map(|k| k.trim().to_string());
        if let Some(dir) = var(ENV_DEFINITIONS_DIR) {
            config.definitions_dir = PathBuf::from(dir);
        }
        if let Some(file) = var(ENV_CACHE_FILE) {
            config.cache_file = PathBuf::from(file);
        }
        if let Some(map) = var(ENV_PREFIX_MAP) {
            config.prefix_map = PrefixMap::parse(&map)?;
        }
        config.collection = var(ENV_COLLECTION);
        if let Some(raw) = var(ENV_CONCURRENCY) {
            config.concurrency = parse_number::<usize>(ENV_CONCURRENCY, &raw)?.max(1);
        }
        if let Some(raw) = var(ENV_MAX_RETRIES) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = var(ENV_RETRY_BASE_MS) {
            config.retry_base = Duration::from_millis(parse_number(ENV_RETRY_BASE_MS, &raw)?);
        }
        if let Some(raw) = var(ENV_TIMEOUT_SECS) {
            config.request_timeout = Duration::from_secs(parse_number(ENV_TIMEOUT_SECS, &raw)?);
        }
        if let Some(bind) = var(ENV_BIND) {
            config.bind = bind;
        }
        if let Some(raw) = var(ENV_WATCH_INTERVAL_SECS) {
            let secs: u64 = parse_number(ENV_WATCH_INTERVAL_SECS, &raw)?;
            config.watch_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(raw) = var(ENV_RECONCILE) {
            config.reconcile = parse_bool(ENV_RECONCILE, &raw)?;
        }
        Ok(config)
    }

    /// Load from the process environment, rooted at the user's home directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::from_lookup(&home, |name| std::env::var(name).ok())
    }

    /// The bearer credential; required for any remote operation.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing { name: ENV_API_KEY })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(name, raw, e.to_string()))
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(name, raw, "expected true/false")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

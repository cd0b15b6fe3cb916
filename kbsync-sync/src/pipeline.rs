//! Local half of a run: manifests to resolved files, cache, and plan.
//!
//! Nothing here talks to the remote, so `kbsync plan` can use it without
//! credentials.

use std::collections::HashSet;
use std::path::PathBuf;

use kbsync_core::{DefinitionSettings, DocumentId, SyncConfig};

use crate::cache_store::{CacheStore, LoadedCache};
use crate::error::SyncError;
use crate::manifest::{discover_manifests, resolve, ManifestSource, Resolution};
use crate::plan::{diff, observe, DiffOptions, ObservedFile, SyncPlan};

/// Manifests in the definitions directory, then any extra manifest paths.
pub fn manifest_sources(config: &SyncConfig) -> Result<Vec<ManifestSource>, SyncError> {
    let mut sources: Vec<ManifestSource> = discover_manifests(&config.definitions_dir)?
        .into_iter()
        .map(ManifestSource::File)
        .collect();
    sources.extend(config.extra_manifests.iter().cloned().map(ManifestSource::File));
    Ok(sources)
}

/// Resolve every manifest using the definitions directory's `config.md`.
pub fn resolve_all(config: &SyncConfig) -> Result<Resolution, SyncError> {
    let settings = DefinitionSettings::load_at(&config.definitions_dir)?;
    let filter = settings.filter()?;
    let sources = manifest_sources(config)?;
    tracing::debug!(manifests = sources.len(), "resolving manifests");
    Ok(resolve(&sources, &config.prefix_map, &filter))
}

/// Canonical real roots of the prefix map, used for document titles.
pub fn title_roots(config: &SyncConfig) -> Vec<PathBuf> {
    config
        .prefix_map
        .real_roots()
        .map(|root| std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()))
        .collect()
}

/// Resolved files plus the cache they are diffed against.
#[derive(Debug)]
pub struct Prepared {
    pub resolution: Resolution,
    pub cache: LoadedCache,
    pub observed: Vec<ObservedFile>,
}

impl Prepared {
    pub fn plan(&self, force: bool, remote_ids: Option<&HashSet<DocumentId>>) -> SyncPlan {
        diff(
            self.observed.clone(),
            &self.cache.entries,
            DiffOptions { force, remote_ids },
        )
    }

    /// Resolution and cache warnings, in that order.
    pub fn warnings(&self) -> Vec<String> {
        self.resolution
            .warnings
            .iter()
            .map(ToString::to_string)
            .chain(self.cache.warning.clone())
            .collect()
    }
}

/// Resolve, load the cache, and fingerprint.
pub fn prepare(config: &SyncConfig, store: &CacheStore) -> Result<Prepared, SyncError> {
    let resolution = resolve_all(config)?;
    let cache = store.load();
    let observed = observe(resolution.files.clone());
    Ok(Prepared {
        resolution,
        cache,
        observed,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use kbsync_core::PrefixMap;
    use tempfile::TempDir;

    use super::*;

    fn config_in(tmp: &TempDir) -> SyncConfig {
        let mut config = SyncConfig::defaults_at(tmp.path());
        config.definitions_dir = tmp.path().join("defs");
        config.cache_file = tmp.path().join("cache.json");
        config
    }

    #[test]
    fn extra_manifests_follow_discovered_ones() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        fs::create_dir_all(&config.definitions_dir).unwrap();
        fs::write(config.definitions_dir.join("docs.md"), "").unwrap();
        config.extra_manifests = vec![tmp.path().join("extra.md")];

        let sources = manifest_sources(&config).unwrap();
        assert_eq!(
            sources,
            vec![
                ManifestSource::File(config.definitions_dir.join("docs.md")),
                ManifestSource::File(tmp.path().join("extra.md")),
            ]
        );
    }

    #[test]
    fn prepare_plans_creates_for_an_empty_cache() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let kb = tmp.path().join("kb");
        fs::create_dir_all(&kb).unwrap();
        fs::create_dir_all(&config.definitions_dir).unwrap();
        fs::write(kb.join("a.md"), "a").unwrap();
        fs::write(kb.join("b.txt"), "b").unwrap();
        fs::write(
            config.definitions_dir.join("docs.md"),
            format!("{}/\n", kb.display()),
        )
        .unwrap();
        fs::write(
            config.definitions_dir.join("config.md"),
            "## Extensions\n.md\n",
        )
        .unwrap();

        let prepared = prepare(&config, &CacheStore::new(&config.cache_file)).unwrap();
        let plan = prepared.plan(false, None);
        assert_eq!(plan.create.len(), 1, "config.md limits extensions to .md");
        assert!(prepared.warnings().is_empty());
    }

    #[test]
    fn title_roots_come_from_the_prefix_map() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.prefix_map =
            PrefixMap::parse(&format!("/knowledge={}", tmp.path().display())).unwrap();
        assert_eq!(
            title_roots(&config),
            vec![fs::canonicalize(tmp.path()).unwrap()]
        );
    }
}

//! Run Coordinator: at most one run at a time, whoever triggers it.
//!
//! The CLI, the HTTP endpoint and the watch loop all call
//! [`Coordinator::try_run`]. A trigger that finds a run in progress gets
//! [`RunOutcome::AlreadyRunning`] straight away; nothing is queued.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::Mutex;

use kbsync_client::{KnowledgeApi, KnowledgeClient};
use kbsync_core::{DefinitionSettings, DocumentId, SyncConfig};

use crate::cache_store::CacheStore;
use crate::error::SyncError;
use crate::executor::{apply, ExecuteOptions};
use crate::pipeline::{prepare, title_roots, Prepared};
use crate::report::{RunResult, RunStatus};

/// Per-run switches. Doubles as the query string of `POST /sync`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunResult),
    AlreadyRunning,
}

#[derive(Clone)]
pub struct Coordinator {
    config: Arc<SyncConfig>,
    api: Arc<dyn KnowledgeApi>,
    store: CacheStore,
    lock: Arc<Mutex<()>>,
}

impl Coordinator {
    /// Build a coordinator backed by the HTTP client.
    ///
    /// Fails fast on a missing credential, an invalid `config.md`, or a cache
    /// location that cannot be written.
    pub fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        let token = config.require_api_key()?.to_string();
        let client = KnowledgeClient::from_config(&config, &token)?;
        Self::with_api(config, Arc::new(client))
    }

    pub fn with_api(config: SyncConfig, api: Arc<dyn KnowledgeApi>) -> Result<Self, SyncError> {
        DefinitionSettings::load_at(&config.definitions_dir)?.filter()?;
        let store = CacheStore::new(&config.cache_file);
        store.check_writable()?;
        Ok(Self {
            config: Arc::new(config),
            api,
            store,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Wait for an in-flight run (if any) to finish.
    pub async fn wait_idle(&self) {
        let _guard = self.lock.lock().await;
    }

    pub async fn try_run(&self, options: RunOptions) -> RunOutcome {
        let Ok(_guard) = self.lock.clone().try_lock_owned() else {
            tracing::info!("sync already in progress, trigger ignored");
            return RunOutcome::AlreadyRunning;
        };
        RunOutcome::Completed(self.run_locked(options).await)
    }

    async fn run_locked(&self, options: RunOptions) -> RunResult {
        let started = Instant::now();
        tracing::info!(dry_run = options.dry_run, force = options.force, "sync run started");

        let config = Arc::clone(&self.config);
        let store = self.store.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare(&config, &store)).await;

        let mut result = match prepared {
            Ok(Ok(prepared)) => self.execute(prepared, options).await,
            Ok(Err(err)) => self.aborted(options, self.config.definitions_dir.clone(), err),
            Err(join) => self.aborted(options, self.config.definitions_dir.clone(), join),
        };

        result.finish(started.elapsed());
        match result.status {
            RunStatus::Success => tracing::info!(
                created = result.created,
                updated = result.updated,
                deleted = result.deleted,
                unchanged = result.unchanged,
                duration_ms = result.duration_ms,
                "sync run finished",
            ),
            status => tracing::warn!(
                ?status,
                failures = result.failures.len(),
                duration_ms = result.duration_ms,
                "sync run finished with errors",
            ),
        }
        result
    }

    async fn execute(&self, prepared: Prepared, options: RunOptions) -> RunResult {
        let mut warnings = prepared.warnings();
        let remote_ids = if self.config.reconcile && !options.dry_run {
            self.remote_ids(&mut warnings).await
        } else {
            None
        };

        let plan = prepared.plan(options.force, remote_ids.as_ref());
        let mut cache = prepared.cache.entries;
        let roots = title_roots(&self.config);
        let mut result = apply(
            plan,
            self.api.as_ref(),
            &mut cache,
            ExecuteOptions {
                dry_run: options.dry_run,
                forced: options.force,
                concurrency: self.config.concurrency,
                title_roots: &roots,
            },
        )
        .await;
        result.warnings = warnings;

        if !options.dry_run {
            if let Err(err) = self.store.save(&cache) {
                tracing::error!(error = %err, "failed to persist sync cache");
                result.abort(self.store.path(), err);
            }
        }
        result
    }

    async fn remote_ids(&self, warnings: &mut Vec<String>) -> Option<HashSet<DocumentId>> {
        match self.api.list_documents().await {
            Ok(docs) => Some(docs.into_iter().map(|d| d.id).collect()),
            Err(err) => {
                tracing::warn!(error = %err, "remote listing failed, skipping reconciliation");
                warnings.push(format!("remote listing failed, reconciliation skipped: {err}"));
                None
            }
        }
    }

    fn aborted(&self, options: RunOptions, path: PathBuf, err: impl ToString) -> RunResult {
        let mut result = RunResult::new(options.dry_run, options.force);
        let message = err.to_string();
        tracing::error!(error = %message, "sync run aborted");
        result.abort(path, message);
        result
    }
}

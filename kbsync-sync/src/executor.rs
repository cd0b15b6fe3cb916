//! Sync Executor: carry out a [`SyncPlan`] against the remote knowledge base.
//!
//! Remote calls are bounded by a [`Semaphore`]; the in-memory cache and the
//! running [`RunResult`] sit behind one [`Mutex`] so completions can land in
//! any order. A failed file never touches its cache entry and never stops
//! the batch.
//!
//! Writes run first. Remote deletes (planned deletes and documents superseded
//! by a new id) run afterwards and skip any document a live cache entry still
//! points at.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, Semaphore};

use kbsync_client::KnowledgeApi;
use kbsync_core::{CacheEntry, DocumentId, Fingerprint};

use crate::cache_store::CacheMap;
use crate::error::{io_err, SyncError};
use crate::plan::{fingerprint_bytes, PlannedDelete, PlannedWrite, SyncPlan};
use crate::report::{Operation, RunResult};

#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions<'a> {
    pub dry_run: bool,
    pub forced: bool,
    /// Maximum in-flight remote calls (at least 1).
    pub concurrency: usize,
    /// Real roots document titles are made relative to.
    pub title_roots: &'a [PathBuf],
}

impl Default for ExecuteOptions<'_> {
    fn default() -> Self {
        Self {
            dry_run: false,
            forced: false,
            concurrency: kbsync_core::config::DEFAULT_CONCURRENCY,
            title_roots: &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn operation(self) -> Operation {
        match self {
            Action::Create => Operation::Create,
            Action::Update => Operation::Update,
            Action::Delete => Operation::Delete,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Action::Create => "created",
            Action::Update => "updated",
            Action::Delete => "deleted",
        }
    }
}

struct Ledger<'c> {
    cache: &'c mut CacheMap,
    result: RunResult,
    /// Ids replaced by a different id during this run.
    superseded: Vec<DocumentId>,
}

impl Ledger<'_> {
    fn count(&mut self, action: Action) {
        match action {
            Action::Create => self.result.created += 1,
            Action::Update => self.result.updated += 1,
            Action::Delete => self.result.deleted += 1,
        }
    }

    /// Ids the cache still points at, ignoring the keys about to be dropped.
    fn referenced_ids(&self, dropping: &HashSet<String>) -> HashSet<DocumentId> {
        self.cache
            .iter()
            .filter(|(key, _)| !dropping.contains(*key))
            .map(|(_, entry)| entry.document_id.clone())
            .collect()
    }
}

/// Planned deletes that share one remote document.
struct DeleteGroup {
    id: DocumentId,
    members: Vec<PlannedDelete>,
}

fn group_by_document(deletes: Vec<PlannedDelete>) -> Vec<DeleteGroup> {
    let mut index: HashMap<DocumentId, usize> = HashMap::new();
    let mut groups: Vec<DeleteGroup> = Vec::new();
    for delete in deletes {
        let id = delete.entry.document_id.clone();
        match index.get(&id) {
            Some(&at) => groups[at].members.push(delete),
            None => {
                index.insert(id.clone(), groups.len());
                groups.push(DeleteGroup {
                    id,
                    members: vec![delete],
                });
            }
        }
    }
    groups
}

/// Apply `plan`, updating `cache` for every confirmed write or delete.
///
/// In dry-run mode nothing leaves the process: no remote call, no cache
/// mutation. Counts still reflect what a fully successful run would do.
pub async fn apply(
    plan: SyncPlan,
    api: &dyn KnowledgeApi,
    cache: &mut CacheMap,
    options: ExecuteOptions<'_>,
) -> RunResult {
    let started = Instant::now();
    let mut result = RunResult::new(options.dry_run, options.forced);
    result.unchanged = plan.unchanged.len();

    let limit = Semaphore::new(options.concurrency.max(1));
    let ledger = Mutex::new(Ledger {
        cache,
        result,
        superseded: Vec::new(),
    });

    let writes = plan
        .create
        .into_iter()
        .map(|w| (Action::Create, w))
        .chain(plan.update.into_iter().map(|w| (Action::Update, w)));
    join_all(writes.map(|(action, write)| write_one(action, write, api, &limit, &ledger, &options)))
        .await;

    if options.dry_run {
        let mut ledger = ledger.lock().await;
        for delete in &plan.delete {
            let path = delete.path();
            tracing::info!(path = %path.display(), id = %delete.entry.document_id, "[dry-run] would delete");
            ledger.count(Action::Delete);
        }
    } else {
        let (remote_deletes, retirements) = release_shared(plan.delete, &ledger).await;
        join_all(
            remote_deletes
                .into_iter()
                .map(|group| delete_group(group, api, &limit, &ledger)),
        )
        .await;
        join_all(retirements.iter().map(|id| retire(api, &limit, id))).await;
    }

    let mut result = ledger.into_inner().result;
    result.finish(started.elapsed());
    tracing::info!(
        created = result.created,
        updated = result.updated,
        deleted = result.deleted,
        unchanged = result.unchanged,
        failed = result.failures.len(),
        dry_run = result.dry_run,
        "plan applied",
    );
    result
}

/// Drop cache entries whose document another live entry still uses, and
/// return the deletes and retirements that really need a remote call.
async fn release_shared(
    deletes: Vec<PlannedDelete>,
    ledger: &Mutex<Ledger<'_>>,
) -> (Vec<DeleteGroup>, Vec<DocumentId>) {
    let dropping: HashSet<String> = deletes.iter().map(|d| d.key.clone()).collect();
    let mut ledger = ledger.lock().await;
    let referenced = ledger.referenced_ids(&dropping);

    let mut remote = Vec::new();
    for group in group_by_document(deletes) {
        if !referenced.contains(&group.id) {
            remote.push(group);
            continue;
        }
        for delete in group.members {
            tracing::info!(
                path = %delete.path().display(),
                id = %group.id,
                "untracked; document kept for another path",
            );
            ledger.cache.remove(&delete.key);
            ledger.count(Action::Delete);
        }
    }

    let deleting: HashSet<DocumentId> = remote.iter().map(|g| g.id.clone()).collect();
    let mut retirements: Vec<DocumentId> = Vec::new();
    for id in std::mem::take(&mut ledger.superseded) {
        if referenced.contains(&id) || deleting.contains(&id) || retirements.contains(&id) {
            tracing::debug!(%id, "superseded document still referenced, keeping");
            continue;
        }
        retirements.push(id);
    }
    (remote, retirements)
}

async fn write_one(
    action: Action,
    write: PlannedWrite,
    api: &dyn KnowledgeApi,
    limit: &Semaphore,
    ledger: &Mutex<Ledger<'_>>,
    options: &ExecuteOptions<'_>,
) {
    let path = write.file.path.clone();
    let title = document_title(&path, options.title_roots);
    let collection = write.file.collection();

    if options.dry_run {
        tracing::info!(
            path = %path.display(),
            %title,
            collection = collection.unwrap_or_default(),
            "[dry-run] would {}",
            action.verb(),
        );
        ledger.lock().await.count(action);
        return;
    }

    match upload(&write, &title, api, limit).await {
        Ok((document_id, fingerprint)) => {
            tracing::info!(path = %path.display(), %title, id = %document_id, "{}", action.past());
            let mut ledger = ledger.lock().await;
            if let Some(previous) = write.previous.filter(|p| *p != document_id) {
                ledger.superseded.push(previous);
            }
            ledger.cache.insert(
                write.file.cache_key(),
                CacheEntry {
                    fingerprint,
                    document_id,
                    collection: collection.map(str::to_string),
                    synced_at: Utc::now(),
                },
            );
            ledger.count(action);
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "{} failed", action.verb());
            ledger
                .lock()
                .await
                .result
                .record_failure(path, action.operation(), err);
        }
    }
}

async fn upload(
    write: &PlannedWrite,
    title: &str,
    api: &dyn KnowledgeApi,
    limit: &Semaphore,
) -> Result<(DocumentId, Fingerprint), SyncError> {
    let _permit = limit.acquire().await.map_err(|_| SyncError::LimiterClosed)?;

    let path = &write.file.path;
    let bytes = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
    // Fingerprint what is actually sent, not what was observed at plan time.
    let fingerprint = fingerprint_bytes(&bytes);
    let content = String::from_utf8(bytes).map_err(|_| SyncError::NotUtf8 { path: path.clone() })?;

    let id = api
        .upsert_document(title, &content, write.file.collection())
        .await?;
    Ok((id, fingerprint))
}

/// Best-effort removal of a document superseded by a new id.
async fn retire(api: &dyn KnowledgeApi, limit: &Semaphore, previous: &DocumentId) {
    let Ok(_permit) = limit.acquire().await else {
        return;
    };
    if let Err(err) = api.delete_document(previous).await {
        tracing::warn!(id = %previous, error = %err, "could not remove superseded document");
    }
}

async fn delete_group(
    group: DeleteGroup,
    api: &dyn KnowledgeApi,
    limit: &Semaphore,
    ledger: &Mutex<Ledger<'_>>,
) {
    let id = &group.id;
    let outcome = match limit.acquire().await {
        Ok(_permit) => api.delete_document(id).await.map_err(SyncError::from),
        Err(_) => Err(SyncError::LimiterClosed),
    };

    let mut ledger = ledger.lock().await;
    for delete in group.members {
        let path = delete.path();
        match &outcome {
            Ok(()) => {
                tracing::info!(path = %path.display(), %id, "{}", Action::Delete.past());
                ledger.cache.remove(&delete.key);
                ledger.count(Action::Delete);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %id, error = %err, "delete failed");
                ledger
                    .result
                    .record_failure(path, Action::Delete.operation(), err);
            }
        }
    }
}

/// Title under which `path` is stored remotely: the path relative to the
/// longest root containing it, otherwise the full path. Always `/`-separated
/// and unique per file.
pub fn document_title(path: &Path, roots: &[PathBuf]) -> String {
    let relative = roots
        .iter()
        .filter_map(|root| {
            path.strip_prefix(root)
                .ok()
                .map(|rest| (root.components().count(), rest))
        })
        .filter(|(_, rest)| !rest.as_os_str().is_empty())
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, rest)| rest);

    relative
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use kbsync_client::{ClientError, RemoteDocument};
    use kbsync_core::ResolvedFile;
    use tempfile::TempDir;

    use super::*;
    use crate::report::RunStatus;

    #[derive(Default)]
    struct RecordingApi {
        upserts: StdMutex<Vec<(String, String, Option<String>)>>,
        deletes: StdMutex<Vec<DocumentId>>,
        fail_titles: Vec<String>,
        /// Fixed id returned for every upsert instead of one per title.
        fixed_id: Option<&'static str>,
        /// When set, each upsert waits for a permit.
        gate: Option<Semaphore>,
        entered: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeApi for RecordingApi {
        async fn upsert_document(
            &self,
            title: &str,
            content: &str,
            collection: Option<&str>,
        ) -> Result<DocumentId, ClientError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if self.fail_titles.iter().any(|t| title.ends_with(t.as_str())) {
                return Err(ClientError::MissingId);
            }
            self.upserts.lock().unwrap().push((
                title.to_string(),
                content.to_string(),
                collection.map(str::to_string),
            ));
            Ok(match self.fixed_id {
                Some(id) => DocumentId::from(id),
                None => DocumentId(format!("id-{title}")),
            })
        }

        async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError> {
            self.deletes.lock().unwrap().push(id.clone());
            Ok(())
        }

        async fn list_documents(&self) -> Result<Vec<RemoteDocument>, ClientError> {
            Ok(Vec::new())
        }
    }

    fn write(path: &Path) -> PlannedWrite {
        PlannedWrite {
            file: ResolvedFile::new(path, "docs"),
            fingerprint: None,
            previous: None,
        }
    }

    fn entry(id: &str) -> CacheEntry {
        CacheEntry {
            fingerprint: Fingerprint::from("x"),
            document_id: DocumentId::from(id),
            collection: Some("docs".into()),
            synced_at: Utc::now(),
        }
    }

    fn planned_delete(cache: &CacheMap, key: &str) -> PlannedDelete {
        PlannedDelete {
            key: key.into(),
            entry: cache[key].clone(),
        }
    }

    #[test]
    fn title_is_relative_to_longest_root() {
        let roots = vec![PathBuf::from("/srv"), PathBuf::from("/srv/kb")];
        assert_eq!(
            document_title(Path::new("/srv/kb/guides/a.md"), &roots),
            "guides/a.md"
        );
        assert_eq!(document_title(Path::new("/srv/other/b.md"), &roots), "other/b.md");
        assert_eq!(document_title(Path::new("/elsewhere/c.md"), &roots), "elsewhere/c.md");
    }

    #[test]
    fn same_file_name_in_two_directories_gets_two_titles() {
        let x = document_title(Path::new("/kb/x/README.md"), &[]);
        let y = document_title(Path::new("/kb/y/README.md"), &[]);
        assert_eq!(x, "kb/x/README.md");
        assert_ne!(x, y);
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_the_batch() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.md");
        let bad = tmp.path().join("bad.md");
        fs::write(&good, "good").unwrap();
        fs::write(&bad, "bad").unwrap();

        let api = RecordingApi {
            fail_titles: vec!["/bad.md".into()],
            ..Default::default()
        };
        let plan = SyncPlan {
            create: vec![write(&bad), write(&good)],
            ..Default::default()
        };
        let mut cache = CacheMap::new();
        let result = apply(plan, &api, &mut cache, ExecuteOptions::default()).await;

        assert_eq!(result.status, RunStatus::PartialFailure);
        assert_eq!(result.created, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, bad);
        assert_eq!(result.failures[0].operation, Operation::Create);
        assert!(cache.contains_key(&good.to_string_lossy().into_owned()));
        assert!(!cache.contains_key(&bad.to_string_lossy().into_owned()));
    }

    #[tokio::test]
    async fn cache_records_fingerprint_and_collection_of_upload() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        fs::write(&file, "hello").unwrap();

        let api = RecordingApi::default();
        let mut cache = CacheMap::new();
        let plan = SyncPlan {
            update: vec![write(&file)],
            ..Default::default()
        };
        apply(plan, &api, &mut cache, ExecuteOptions::default()).await;

        let entry = &cache[&file.to_string_lossy().into_owned()];
        let title = document_title(&file, &[]);
        assert_eq!(entry.fingerprint, fingerprint_bytes(b"hello"));
        assert_eq!(entry.document_id, DocumentId(format!("id-{title}")));
        assert_eq!(entry.collection.as_deref(), Some("docs"));

        let upserts = api.upserts.lock().unwrap();
        assert_eq!(upserts[0].1, "hello");
        assert_eq!(upserts[0].2.as_deref(), Some("docs"));
    }

    #[tokio::test]
    async fn non_utf8_file_is_a_per_file_failure() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("latin1.txt");
        fs::write(&file, [0xff, 0xfe, 0x00]).unwrap();

        let api = RecordingApi::default();
        let plan = SyncPlan {
            create: vec![write(&file)],
            ..Default::default()
        };
        let result = apply(plan, &api, &mut CacheMap::new(), ExecuteOptions::default()).await;
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].error.contains("UTF-8"));
        assert!(api.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_is_read_only_once_a_call_slot_is_free() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first.md");
        let second = tmp.path().join("second.md");
        fs::write(&first, "first").unwrap();
        fs::write(&second, "original").unwrap();

        let api = RecordingApi {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        };
        let plan = SyncPlan {
            create: vec![write(&first), write(&second)],
            ..Default::default()
        };
        let options = ExecuteOptions {
            concurrency: 1,
            ..Default::default()
        };
        let mut cache = CacheMap::new();

        let run = apply(plan, &api, &mut cache, options);
        let edit_while_blocked = async {
            while api.entered.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            fs::write(&second, "edited").unwrap();
            if let Some(gate) = &api.gate {
                gate.add_permits(2);
            }
        };
        let (result, ()) = tokio::join!(run, edit_while_blocked);

        assert_eq!(result.created, 2);
        let upserts = api.upserts.lock().unwrap();
        assert_eq!(upserts[1].1, "edited");
    }

    #[tokio::test]
    async fn dry_run_counts_without_calling_the_api() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        fs::write(&file, "a").unwrap();

        let mut cache = CacheMap::new();
        cache.insert("/gone.md".into(), entry("d-gone"));
        let before = cache.clone();
        let plan = SyncPlan {
            create: vec![write(&file)],
            delete: vec![planned_delete(&before, "/gone.md")],
            ..Default::default()
        };

        let api = RecordingApi::default();
        let options = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = apply(plan, &api, &mut cache, options).await;

        assert!(result.dry_run);
        assert_eq!((result.created, result.deleted), (1, 1));
        assert!(api.upserts.lock().unwrap().is_empty());
        assert!(api.deletes.lock().unwrap().is_empty());
        assert_eq!(cache, before);
    }

    #[tokio::test]
    async fn superseded_document_is_removed() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        fs::write(&file, "a").unwrap();

        let api = RecordingApi::default();
        let plan = SyncPlan {
            update: vec![PlannedWrite {
                previous: Some(DocumentId::from("old-id")),
                ..write(&file)
            }],
            ..Default::default()
        };
        let result = apply(plan, &api, &mut CacheMap::new(), ExecuteOptions::default()).await;
        assert_eq!(result.updated, 1);
        assert_eq!(*api.deletes.lock().unwrap(), vec![DocumentId::from("old-id")]);
    }

    #[tokio::test]
    async fn superseded_document_still_in_use_is_kept() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        fs::write(&file, "a").unwrap();

        let mut cache = CacheMap::new();
        cache.insert("/kb/other.md".into(), entry("old-id"));
        let plan = SyncPlan {
            update: vec![PlannedWrite {
                previous: Some(DocumentId::from("old-id")),
                ..write(&file)
            }],
            ..Default::default()
        };

        let api = RecordingApi::default();
        let result = apply(plan, &api, &mut cache, ExecuteOptions::default()).await;
        assert_eq!(result.updated, 1);
        assert!(api.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_shared_document_only_drops_the_cache_entry() {
        let mut cache = CacheMap::new();
        cache.insert("/kb/x/README.md".into(), entry("d1"));
        cache.insert("/kb/y/README.md".into(), entry("d1"));
        let plan = SyncPlan {
            delete: vec![planned_delete(&cache, "/kb/y/README.md")],
            unchanged: vec![ResolvedFile::new("/kb/x/README.md", "docs")],
            ..Default::default()
        };

        let api = RecordingApi::default();
        let result = apply(plan, &api, &mut cache, ExecuteOptions::default()).await;

        assert!(result.is_success());
        assert_eq!(result.deleted, 1);
        assert!(api.deletes.lock().unwrap().is_empty());
        assert!(cache.contains_key("/kb/x/README.md"));
        assert!(!cache.contains_key("/kb/y/README.md"));
    }

    #[tokio::test]
    async fn deletes_sharing_a_document_call_the_remote_once() {
        let mut cache = CacheMap::new();
        cache.insert("/old/a.md".into(), entry("d1"));
        cache.insert("/old/b.md".into(), entry("d1"));
        let plan = SyncPlan {
            delete: vec![
                planned_delete(&cache, "/old/a.md"),
                planned_delete(&cache, "/old/b.md"),
            ],
            ..Default::default()
        };

        let api = RecordingApi::default();
        let result = apply(plan, &api, &mut cache, ExecuteOptions::default()).await;

        assert_eq!(result.deleted, 2);
        assert_eq!(*api.deletes.lock().unwrap(), vec![DocumentId::from("d1")]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn moved_root_reuses_the_document_instead_of_deleting_it() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        fs::write(&file, "a").unwrap();

        let mut cache = CacheMap::new();
        cache.insert("/host/kb/a.md".into(), entry("d1"));
        let plan = SyncPlan {
            create: vec![write(&file)],
            delete: vec![planned_delete(&cache, "/host/kb/a.md")],
            ..Default::default()
        };

        let api = RecordingApi {
            fixed_id: Some("d1"),
            ..Default::default()
        };
        let result = apply(plan, &api, &mut cache, ExecuteOptions::default()).await;

        assert_eq!((result.created, result.deleted), (1, 1));
        assert!(api.deletes.lock().unwrap().is_empty());
        assert_eq!(cache[&file.to_string_lossy().into_owned()].document_id, DocumentId::from("d1"));
    }
}

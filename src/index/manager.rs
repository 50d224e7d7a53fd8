//! Index lifecycle orchestration
//!
//! IndexManager owns the per-directory lock registry and in-flight build
//! table, and sequences every operation so that concurrent queries never
//! observe a half-rebuilt index. Scope directories are fully independent:
//! no lock spans more than one index directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::expand::{IdentityExpander, QueryExpander};
use crate::index::events::{BuildOutcome, IndexEndEvent, IndexProgressHandler, IndexStartEvent};
use crate::index::failure::FailureTracker;
use crate::index::paths::{IndexLocations, TRASH_SUBDIR};
use crate::index::rwlock::RwLock;
use crate::index::state::IndexState;
use crate::indexer::build::IndexBuilder;
use crate::indexer::config::IndexerConfig;
use crate::indexer::error::IndexerError;
use crate::indexer::query::IndexQuerier;
use crate::indexer::results::SearchHit;
use crate::indexer::staleness::StalenessChecker;

/// Attempts tolerated for the "index deleted between ensure and query" race
const QUERY_RETRY_LIMIT: u32 = 10;

/// Options controlling `ensure_index`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureOptions {
    /// Build even though the last attempt failed
    pub retry_if_last_attempt_failed: bool,

    /// Build even though a valid index already exists (forced rebuild)
    pub ignore_existing: bool,
}

/// An in-flight search for one scope directory
///
/// Each scope directory's search runs independently; awaiting one never
/// blocks on a sibling directory's build. Errors are isolated per
/// directory.
#[derive(Debug)]
pub struct ScopeSearch {
    pub scope_dir: PathBuf,
    handle: JoinHandle<Result<Vec<SearchHit>, IndexerError>>,
}

impl ScopeSearch {
    /// Wait for this scope directory's hits
    pub async fn hits(self) -> Result<Vec<SearchHit>, IndexerError> {
        match self.handle.await {
            Ok(hits) => hits,
            Err(e) => Err(IndexerError::Io(std::io::Error::other(e))),
        }
    }
}

/// Orchestrates index builds, queries, staleness checks and deletion
#[derive(Clone)]
pub struct IndexManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<IndexerConfig>,
    builder: IndexBuilder,
    querier: IndexQuerier,
    staleness: StalenessChecker,
    failures: FailureTracker,
    expander: Arc<dyn QueryExpander>,

    /// One lock per canonical index directory, created lazily and reused
    /// for the manager's whole lifetime
    locks: StdMutex<HashMap<PathBuf, Arc<RwLock>>>,

    /// In-flight builds keyed by index directory; presence means `Indexing`
    building: StdMutex<HashMap<PathBuf, CancellationToken>>,

    handlers: StdMutex<Vec<Arc<dyn IndexProgressHandler>>>,

    /// Parent cancellation scope for every build; cancelled on shutdown so
    /// no indexer subprocess outlives the manager
    shutdown: CancellationToken,
}

impl IndexManager {
    /// Create a manager with the pass-through query expander
    pub fn new(config: IndexerConfig) -> Self {
        Self::with_expander(config, Arc::new(IdentityExpander))
    }

    /// Create a manager with an explicit query expansion service
    pub fn with_expander(config: IndexerConfig, expander: Arc<dyn QueryExpander>) -> Self {
        let config = Arc::new(config);
        Self {
            inner: Arc::new(ManagerInner {
                builder: IndexBuilder::new(Arc::clone(&config)),
                querier: IndexQuerier::new(Arc::clone(&config)),
                staleness: StalenessChecker::new(Arc::clone(&config)),
                failures: FailureTracker::new(&config.index_root),
                expander,
                locks: StdMutex::new(HashMap::new()),
                building: StdMutex::new(HashMap::new()),
                handlers: StdMutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    /// Subscribe to build progress events
    pub fn subscribe(&self, handler: Arc<dyn IndexProgressHandler>) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug
        self.inner.handlers.lock().unwrap().push(handler);
    }

    /// Cancel every in-flight build and prevent new subprocesses
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Cancel the in-flight build for a scope dir, if any
    pub fn cancel_build(&self, scope_dir: &Path) -> bool {
        let locations = self.locations(scope_dir);
        let building = self.inner.building.lock().unwrap();
        match building.get(&locations.index_dir) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Build the index for a scope directory if needed
    ///
    /// Idempotent when a valid index exists (unless forced); silently
    /// skipped when the last attempt failed and no retry was requested, so
    /// a known-bad build is never hammered.
    pub async fn ensure_index(
        &self,
        scope_dir: &Path,
        options: EnsureOptions,
    ) -> Result<(), IndexerError> {
        let locations = self.locations(scope_dir);
        let lock = self.lock_for(&locations);
        lock.with_write(|| self.ensure_index_locked(scope_dir, &locations, options))
            .await
    }

    /// Query one or more scope directories, building missing indexes first
    ///
    /// The raw query is expanded once; each scope directory's search then
    /// runs in its own task, and the returned handles (in input order) can
    /// be awaited individually, so an already-indexed directory's hits are
    /// available without waiting for a sibling's build.
    pub async fn get_results(
        &self,
        query: &str,
        scope_dirs: &[PathBuf],
    ) -> Result<Vec<ScopeSearch>, IndexerError> {
        let expanded = self.inner.expander.expand(query).await?;
        debug!("Expanded query {:?} to {:?}", query, expanded);

        let mut searches = Vec::with_capacity(scope_dirs.len());
        for scope_dir in scope_dirs {
            let manager = self.clone();
            let task_scope = scope_dir.clone();
            let expanded = expanded.clone();
            searches.push(ScopeSearch {
                scope_dir: scope_dir.clone(),
                handle: tokio::spawn(async move {
                    manager.results_for_scope(&expanded, &task_scope).await
                }),
            });
        }
        Ok(searches)
    }

    /// Delete the index for a scope directory
    ///
    /// The index directory is renamed into a uniquely timestamped trash
    /// location (fast, never blocks on a slow recursive delete) and the
    /// trash is removed by a detached background task.
    pub async fn delete_index(&self, scope_dir: &Path) -> Result<(), IndexerError> {
        let locations = self.locations(scope_dir);
        let lock = self.lock_for(&locations);
        lock.with_write(|| async {
            if !fs::try_exists(&locations.index_dir).await.unwrap_or(false) {
                return Ok(());
            }

            let trash_root = self.inner.config.index_root.join(TRASH_SUBDIR);
            fs::create_dir_all(&trash_root).await?;

            let name = locations
                .index_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| locations.escaped_name());
            let trash_dir =
                trash_root.join(format!("{}-{}", name, chrono::Utc::now().timestamp_millis()));

            if fs::try_exists(&trash_dir).await.unwrap_or(false) {
                return Err(IndexerError::TrashCollision { path: trash_dir });
            }

            fs::rename(&locations.index_dir, &trash_dir).await?;
            info!(
                "Deleted index for {}, trash removal continues in background",
                scope_dir.display()
            );

            tokio::spawn(async move {
                if let Err(e) = fs::remove_dir_all(&trash_dir).await {
                    warn!(
                        "Failed to remove trashed index {}: {}",
                        trash_dir.display(),
                        e
                    );
                }
            });
            Ok(())
        })
        .await
    }

    /// Report the lifecycle state of a scope directory's index
    pub async fn index_status(&self, scope_dir: &Path) -> IndexState {
        let locations = self.locations(scope_dir);

        if self
            .inner
            .building
            .lock()
            .unwrap()
            .contains_key(&locations.index_dir)
        {
            return IndexState::Indexing;
        }

        let lock = self.lock_for(&locations);
        lock.with_read(|| async {
            let index_exists = locations.index_exists().await;
            let last_build_failed = self.inner.failures.did_fail(&locations).await;
            IndexState::derive(false, index_exists, last_build_failed)
        })
        .await
    }

    /// Rebuild the index if the corpus has drifted since the last build
    ///
    /// An unknown diff falls back to a normal ensure. A stale diff forces a
    /// rebuild over the existing index, but still respects the failure
    /// sentinel so a known-bad build is not retried by the staleness sweep.
    pub async fn reindex_if_stale(&self, scope_dir: &Path) -> Result<(), IndexerError> {
        let locations = self.locations(scope_dir);
        match self.inner.staleness.check(&locations, scope_dir).await {
            None => {
                debug!(
                    "Staleness unknown for {}, running a normal ensure",
                    scope_dir.display()
                );
                self.ensure_index(scope_dir, EnsureOptions::default()).await
            }
            Some(diff) if diff.should_reindex() => {
                info!(
                    "Corpus for {} is stale ({:?}), forcing a rebuild",
                    scope_dir.display(),
                    diff
                );
                self.ensure_index(
                    scope_dir,
                    EnsureOptions {
                        ignore_existing: true,
                        retry_if_last_attempt_failed: false,
                    },
                )
                .await
            }
            Some(_) => {
                debug!("Index for {} is fresh enough", scope_dir.display());
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn locations(&self, scope_dir: &Path) -> IndexLocations {
        IndexLocations::resolve(&self.inner.config.index_root, scope_dir)
    }

    /// Get or create the lock for an index directory
    ///
    /// Locks are keyed by the canonical index directory and never
    /// re-created, so two spellings of one scope dir share a lock.
    fn lock_for(&self, locations: &IndexLocations) -> Arc<RwLock> {
        let mut locks = self.inner.locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(locations.index_dir.clone())
                .or_insert_with(|| Arc::new(RwLock::new())),
        )
    }

    /// The ensure body; caller must hold the write lock
    async fn ensure_index_locked(
        &self,
        scope_dir: &Path,
        locations: &IndexLocations,
        options: EnsureOptions,
    ) -> Result<(), IndexerError> {
        if !options.ignore_existing && locations.index_exists().await {
            debug!("Index for {} already exists", scope_dir.display());
            return Ok(());
        }

        if !options.retry_if_last_attempt_failed && self.inner.failures.did_fail(locations).await {
            info!(
                "Skipping build for {}: last attempt failed and retry was not requested",
                scope_dir.display()
            );
            return Ok(());
        }

        self.build_index(scope_dir, locations).await
    }

    async fn build_index(
        &self,
        scope_dir: &Path,
        locations: &IndexLocations,
    ) -> Result<(), IndexerError> {
        let cancel = self.inner.shutdown.child_token();
        self.inner
            .building
            .lock()
            .unwrap()
            .insert(locations.index_dir.clone(), cancel.clone());

        self.emit_start(scope_dir, cancel.clone()).await;

        let result = self.inner.builder.build(scope_dir, locations, &cancel).await;

        self.inner
            .building
            .lock()
            .unwrap()
            .remove(&locations.index_dir);

        let outcome = match &result {
            Ok(()) => {
                self.inner.failures.clear(locations).await?;
                BuildOutcome::Succeeded
            }
            Err(e) if e.is_cancelled() => {
                // Not a failure: the sentinel stays untouched so a later
                // legitimate retry is not blocked
                info!("Build for {} was cancelled", scope_dir.display());
                BuildOutcome::Cancelled
            }
            Err(e) => {
                error!("Build for {} failed: {}", scope_dir.display(), e);
                if let Err(mark_err) = self.inner.failures.mark_failed(locations).await {
                    warn!(
                        "Could not persist failure sentinel for {}: {}",
                        scope_dir.display(),
                        mark_err
                    );
                }
                BuildOutcome::Failed
            }
        };

        self.emit_end(scope_dir, outcome).await;
        result
    }

    /// One scope directory's share of `get_results`
    ///
    /// The read-lock re-check tolerates the race where a concurrent writer
    /// deletes the index between the ensure and the query; the loop has no
    /// backoff, trading politeness under contention for latency.
    async fn results_for_scope(
        &self,
        expanded_query: &str,
        scope_dir: &Path,
    ) -> Result<Vec<SearchHit>, IndexerError> {
        let locations = self.locations(scope_dir);
        let lock = self.lock_for(&locations);

        for attempt in 0..QUERY_RETRY_LIMIT {
            lock.with_write(|| {
                self.ensure_index_locked(scope_dir, &locations, EnsureOptions::default())
            })
            .await?;

            let outcome = lock
                .with_read(|| async {
                    if !locations.index_exists().await {
                        return Ok(None);
                    }
                    self.inner
                        .querier
                        .query(&locations, scope_dir, expanded_query)
                        .await
                        .map(Some)
                })
                .await?;

            match outcome {
                Some(hits) => return Ok(hits),
                None => debug!(
                    "Index for {} vanished before query (attempt {}), retrying",
                    scope_dir.display(),
                    attempt + 1
                ),
            }
        }

        Err(IndexerError::RetriesExhausted {
            scope_dir: scope_dir.to_path_buf(),
            attempts: QUERY_RETRY_LIMIT,
        })
    }

    async fn emit_start(&self, scope_dir: &Path, cancel: CancellationToken) {
        let handlers: Vec<_> = self.inner.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler
                .on_index_start(IndexStartEvent {
                    scope_dir: scope_dir.to_path_buf(),
                    cancel: cancel.clone(),
                })
                .await;
        }
    }

    async fn emit_end(&self, scope_dir: &Path, outcome: BuildOutcome) {
        let handlers: Vec<_> = self.inner.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler
                .on_index_end(IndexEndEvent {
                    scope_dir: scope_dir.to_path_buf(),
                    outcome,
                })
                .await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

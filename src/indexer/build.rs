//! Index build subprocess management
//!
//! Drives the indexer's `add` subcommand against a staging directory and
//! atomically publishes the result. The rename onto the index directory is
//! the sole publish point: before it no reader can observe the new index,
//! after it the full new index is visible at once.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::index::paths::IndexLocations;
use crate::indexer::config::{CPU_COUNT_ENV, IndexerConfig};
use crate::indexer::error::IndexerError;
use crate::indexer::process::{self, IndexerInvocation};

/// Builds indexes by spawning the indexer's `add` subcommand
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    config: Arc<IndexerConfig>,
}

impl IndexBuilder {
    pub fn new(config: Arc<IndexerConfig>) -> Self {
        Self { config }
    }

    /// Build the index for `scope_dir` and publish it atomically
    ///
    /// The subprocess indexes into the staging directory; on exit 0 the old
    /// index directory is removed and the staging directory renamed into its
    /// place. Staging is always cleaned up, whatever the outcome.
    pub async fn build(
        &self,
        scope_dir: &Path,
        locations: &IndexLocations,
        cancel: &CancellationToken,
    ) -> Result<(), IndexerError> {
        info!(
            "Building index for {} at {}",
            scope_dir.display(),
            locations.index_dir.display()
        );

        // A leftover staging directory means an earlier build died mid-write
        remove_dir_if_exists(&locations.tmp_dir).await?;

        let result = self.build_and_publish(scope_dir, locations, cancel).await;

        // Final cleanup regardless of outcome
        if let Err(e) = remove_dir_if_exists(&locations.tmp_dir).await {
            warn!(
                "Failed to clean up staging directory {}: {}",
                locations.tmp_dir.display(),
                e
            );
        }

        result
    }

    async fn build_and_publish(
        &self,
        scope_dir: &Path,
        locations: &IndexLocations,
        cancel: &CancellationToken,
    ) -> Result<(), IndexerError> {
        let invocation = IndexerInvocation {
            program: self.config.indexer_path.clone(),
            args: vec![
                "--index-root".to_string(),
                locations.tmp_dir.to_string_lossy().into_owned(),
                "add".to_string(),
                scope_dir.to_string_lossy().into_owned(),
            ],
            envs: vec![(CPU_COUNT_ENV.to_string(), build_cpu_count().to_string())],
            timeout: self.config.build_timeout,
            max_output_bytes: self.config.max_output_bytes,
            operation: "build",
        };

        let output = process::run(invocation, cancel).await?;
        if !output.status.success() {
            return Err(IndexerError::BuildFailed {
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        // Publish: replace the old index, then one atomic rename
        remove_dir_if_exists(&locations.index_dir).await?;
        if let Some(parent) = locations.index_dir.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&locations.tmp_dir, &locations.index_dir).await?;

        debug!("Published index at {}", locations.index_dir.display());
        Ok(())
    }
}

/// CPU parallelism cap for the build subprocess
///
/// Indexing must not starve the foreground application: one core, or two on
/// hosts with more than four.
fn build_cpu_count() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) if n.get() > 4 => 2,
        _ => 1,
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), IndexerError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IndexerError::Io(e)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeIndexer;
    use std::time::Duration;

    #[test]
    fn test_build_cpu_count_bounds() {
        let cpus = build_cpu_count();
        assert!(cpus == 1 || cpus == 2);
    }

    #[tokio::test]
    async fn test_build_publishes_atomically_and_cleans_staging() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let builder = IndexBuilder::new(Arc::clone(&config));

        let scope = temp.path().join("repo");
        tokio::fs::create_dir_all(&scope).await.unwrap();
        let locations = IndexLocations::resolve(&config.index_root, &scope);

        builder
            .build(&scope, &locations, &CancellationToken::new())
            .await
            .unwrap();

        assert!(locations.index_exists().await);
        assert!(!tokio::fs::try_exists(&locations.tmp_dir).await.unwrap());

        // The subprocess staged under .tmp, never into the published dir
        let build_invocation = fake
            .invocations()
            .into_iter()
            .find(|line| line.contains(" add "))
            .unwrap();
        assert!(build_invocation.contains(&locations.tmp_dir.to_string_lossy().into_owned()));
    }

    #[tokio::test]
    async fn test_build_caps_cpu_parallelism() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let builder = IndexBuilder::new(Arc::clone(&config));

        let scope = temp.path().join("repo");
        tokio::fs::create_dir_all(&scope).await.unwrap();
        let locations = IndexLocations::resolve(&config.index_root, &scope);

        builder
            .build(&scope, &locations, &CancellationToken::new())
            .await
            .unwrap();

        let recorded: usize = fake.gomaxprocs().unwrap().trim().parse().unwrap();
        assert_eq!(recorded, build_cpu_count());
    }

    #[tokio::test]
    async fn test_build_failure_propagates_and_cleans_staging() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_add_failure(true);
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let builder = IndexBuilder::new(Arc::clone(&config));

        let scope = temp.path().join("repo");
        tokio::fs::create_dir_all(&scope).await.unwrap();
        let locations = IndexLocations::resolve(&config.index_root, &scope);

        let result = builder
            .build(&scope, &locations, &CancellationToken::new())
            .await;

        match result {
            Err(IndexerError::BuildFailed { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("index build exploded"));
            }
            other => panic!("expected BuildFailed, got {other:?}"),
        }
        assert!(!locations.index_exists().await);
        assert!(!tokio::fs::try_exists(&locations.tmp_dir).await.unwrap());
    }

    #[tokio::test]
    async fn test_build_cancellation_is_distinct_from_failure() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_add_delay("30");
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let builder = IndexBuilder::new(Arc::clone(&config));

        let scope = temp.path().join("repo");
        tokio::fs::create_dir_all(&scope).await.unwrap();
        let locations = IndexLocations::resolve(&config.index_root, &scope);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let result = builder.build(&scope, &locations, &cancel).await;

        assert!(matches!(result, Err(IndexerError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!locations.index_exists().await);
    }

    #[tokio::test]
    async fn test_build_replaces_existing_index() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let builder = IndexBuilder::new(Arc::clone(&config));

        let scope = temp.path().join("repo");
        tokio::fs::create_dir_all(&scope).await.unwrap();
        let locations = IndexLocations::resolve(&config.index_root, &scope);

        // Pre-existing index with a stray file that must not survive
        tokio::fs::create_dir_all(&locations.index_dir).await.unwrap();
        tokio::fs::write(locations.index_dir.join("stale-shard"), b"old")
            .await
            .unwrap();

        builder
            .build(&scope, &locations, &CancellationToken::new())
            .await
            .unwrap();

        assert!(locations.index_exists().await);
        assert!(
            !tokio::fs::try_exists(locations.index_dir.join("stale-shard"))
                .await
                .unwrap()
        );
    }
}

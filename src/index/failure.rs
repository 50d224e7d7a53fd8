//! Persisted build-failure tracking
//!
//! A zero-byte sentinel file under `.failed/` records "the last build
//! attempt for this scope dir failed". The file's existence is the sole
//! encoding; it survives process restarts so a known-bad build is not
//! retried automatically on the next launch.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::index::paths::{FAILED_SUBDIR, IndexLocations};
use crate::indexer::error::IndexerError;

/// Tracks build failures via sentinel files under the index root
#[derive(Debug, Clone)]
pub struct FailureTracker {
    failed_root: PathBuf,
}

impl FailureTracker {
    pub fn new(index_root: &Path) -> Self {
        Self {
            failed_root: index_root.join(FAILED_SUBDIR),
        }
    }

    fn sentinel_path(&self, locations: &IndexLocations) -> PathBuf {
        self.failed_root.join(locations.escaped_name())
    }

    /// Record that the last build for this scope dir failed
    pub async fn mark_failed(&self, locations: &IndexLocations) -> Result<(), IndexerError> {
        fs::create_dir_all(&self.failed_root).await?;
        let sentinel = self.sentinel_path(locations);
        fs::write(&sentinel, b"").await?;
        debug!("Created failure sentinel {}", sentinel.display());
        Ok(())
    }

    /// Check whether the last build for this scope dir failed
    pub async fn did_fail(&self, locations: &IndexLocations) -> bool {
        fs::try_exists(self.sentinel_path(locations))
            .await
            .unwrap_or(false)
    }

    /// Forget a recorded failure; absent sentinel is not an error
    pub async fn clear(&self, locations: &IndexLocations) -> Result<(), IndexerError> {
        match fs::remove_file(self.sentinel_path(locations)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexerError::Io(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

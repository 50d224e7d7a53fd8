//! Corpus staleness checking via the indexer's `status` subcommand
//!
//! The indexer reports how the corpus has drifted since the last build as a
//! corpus diff. The rebuild decision throttles to at most one rebuild per
//! interval per scope dir, but rebuilds immediately when the diff tool
//! cannot report elapsed time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::index::paths::IndexLocations;
use crate::indexer::config::IndexerConfig;
use crate::indexer::process::{self, IndexerInvocation};

/// Minimum elapsed time between staleness-triggered rebuilds (24 hours)
pub const REINDEX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Summary of corpus changes since the last index build
///
/// Wire shape of the `status` subcommand output. A diff with both change
/// fields absent is malformed and treated as unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusDiff {
    /// The indexer suspects changes but could not enumerate them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maybe_changed_files: Option<bool>,

    /// Files changed since the last build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<String>>,

    /// Milliseconds since the last build, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub millis_elapsed: Option<u64>,
}

impl CorpusDiff {
    /// A diff that names no change information at all is malformed
    pub fn is_malformed(&self) -> bool {
        self.maybe_changed_files.is_none() && self.changed_files.is_none()
    }

    /// Whether the diff reports any corpus change
    pub fn has_changes(&self) -> bool {
        self.maybe_changed_files == Some(true)
            || self.changed_files.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Whether enough time has passed to allow another rebuild
    ///
    /// Missing elapsed time counts as elapsed: if the diff tool cannot say
    /// how old the index is, staleness throttling must not block a rebuild.
    pub fn interval_elapsed(&self) -> bool {
        match self.millis_elapsed {
            None => true,
            Some(millis) => u128::from(millis) > REINDEX_INTERVAL.as_millis(),
        }
    }

    /// The rebuild decision rule
    pub fn should_reindex(&self) -> bool {
        self.interval_elapsed() && self.has_changes()
    }
}

/// Checks index staleness by spawning the indexer's `status` subcommand
#[derive(Debug, Clone)]
pub struct StalenessChecker {
    config: Arc<IndexerConfig>,
}

impl StalenessChecker {
    pub fn new(config: Arc<IndexerConfig>) -> Self {
        Self { config }
    }

    /// Fetch the corpus diff for `scope_dir`
    ///
    /// Returns `None` on any subprocess or parse error, which callers treat
    /// as "unknown, needs a normal ensure" rather than a hard failure.
    pub async fn check(
        &self,
        locations: &IndexLocations,
        scope_dir: &Path,
    ) -> Option<CorpusDiff> {
        let invocation = IndexerInvocation {
            program: self.config.indexer_path.clone(),
            args: vec![
                "--index-root".to_string(),
                locations.index_dir.to_string_lossy().into_owned(),
                "status".to_string(),
                scope_dir.to_string_lossy().into_owned(),
            ],
            envs: vec![],
            timeout: self.config.query_timeout,
            max_output_bytes: self.config.max_output_bytes,
            operation: "status",
        };

        let cancel = CancellationToken::new();
        let output = match process::run(invocation, &cancel).await {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    "Status check for {} failed, treating staleness as unknown: {}",
                    scope_dir.display(),
                    e
                );
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                "Status subcommand for {} exited with {:?}: {}",
                scope_dir.display(),
                output.status.code(),
                output.stderr.trim()
            );
            return None;
        }

        let diff: CorpusDiff = match serde_json::from_str(&output.stdout) {
            Ok(diff) => diff,
            Err(e) => {
                warn!(
                    "Unparseable status output for {}: {}",
                    scope_dir.display(),
                    e
                );
                return None;
            }
        };

        if diff.is_malformed() {
            debug!(
                "Status output for {} names no change fields, treating as unknown",
                scope_dir.display()
            );
            return None;
        }

        Some(diff)
    }
}

// ============================================================================
// Tests
// ============================================================================

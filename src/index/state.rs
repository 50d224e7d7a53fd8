//! Derived index lifecycle state
//!
//! The state machine per scope directory:
//!
//! ```text
//! unindexed -> indexing    build started on a missing index
//! indexing  -> ready       build subprocess exit 0, atomic publish
//! indexing  -> failed      build subprocess failure (sentinel created)
//! failed    -> indexing    retry requested
//! ready     -> indexing    forced rebuild
//! any       -> unindexed   index deleted
//! ```
//!
//! `Indexing` is in-memory only and is lost on process restart; the other
//! states derive from on-disk facts (index presence, failure sentinel), so
//! the logic branches on this enum rather than scattered existence checks.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one scope directory's index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// No index exists and no failure is recorded
    Unindexed,
    /// A build is in flight right now
    Indexing,
    /// A complete, consistent index is published
    Ready,
    /// The last build attempt failed
    Failed,
}

impl IndexState {
    /// Derive the state from the in-flight flag and on-disk facts
    ///
    /// A published index wins over a stale sentinel: the sentinel is only
    /// meaningful while no index exists, since success always clears it.
    pub fn derive(build_in_flight: bool, index_exists: bool, last_build_failed: bool) -> Self {
        if build_in_flight {
            Self::Indexing
        } else if index_exists {
            Self::Ready
        } else if last_build_failed {
            Self::Failed
        } else {
            Self::Unindexed
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unindexed => "unindexed",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

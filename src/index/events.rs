//! Progress events fired around index builds
//!
//! The start event carries a cancellation token so subscribers can abort
//! the build they are watching; the end event reports the outcome. This is
//! the only manager state exposed to the outside.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Fired when a build starts for a scope directory
#[derive(Debug, Clone)]
pub struct IndexStartEvent {
    pub scope_dir: PathBuf,

    /// Cancelling this token kills the build subprocess
    pub cancel: CancellationToken,
}

/// Fired when a build finishes, however it finished
#[derive(Debug, Clone)]
pub struct IndexEndEvent {
    pub scope_dir: PathBuf,
    pub outcome: BuildOutcome,
}

/// How a build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Subscriber interface for build progress
#[async_trait]
pub trait IndexProgressHandler: Send + Sync {
    /// Called just before the build subprocess is spawned
    async fn on_index_start(&self, event: IndexStartEvent);

    /// Called after the build completes, fails or is cancelled
    async fn on_index_end(&self, event: IndexEndEvent);
}

//! Error types for driving the external indexer executable
//!
//! The taxonomy distinguishes failures that require different remediation:
//! a missing binary, an unauthorized query, a failed build (persisted via
//! the failure sentinel), explicit cancellation (never persisted), and
//! budget overruns.

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Indexer Errors
// ============================================================================

/// Errors produced while building, querying or inspecting an index
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// The indexer executable could not be spawned because it does not exist
    #[error("indexer binary not found: {path}")]
    BinaryNotFound { path: String },

    /// The indexer rejected the request as unauthorized
    #[error("indexer reported unauthorized access: {detail}")]
    Unauthorized { detail: String },

    /// The `add` subprocess exited with a non-zero status
    #[error("index build failed (exit code {code:?}): {stderr}")]
    BuildFailed { code: Option<i32>, stderr: String },

    /// The `query` subprocess exited with a non-zero status
    #[error("index query failed (exit code {code:?}): {stderr}")]
    QueryFailed { code: Option<i32>, stderr: String },

    /// The operation was cancelled explicitly; distinct from failure so a
    /// cancelled build never blocks a later retry
    #[error("operation cancelled")]
    Cancelled,

    /// A subprocess exceeded its time budget and was killed
    #[error("{operation} exceeded its {budget:?} budget")]
    Timeout {
        operation: String,
        budget: Duration,
    },

    /// Subprocess output could not be parsed into the expected shape
    #[error("malformed indexer output: {reason}")]
    MalformedOutput { reason: String },

    /// Subprocess stdout exceeded the configured size cap
    #[error("indexer output exceeded {limit} bytes")]
    OutputLimitExceeded { limit: u64 },

    /// The uniquely named trash directory already exists
    #[error("trash target already exists: {path}")]
    TrashCollision { path: PathBuf },

    /// The index kept disappearing between ensure and query
    #[error("index for {scope_dir} disappeared during {attempts} query attempts")]
    RetriesExhausted { scope_dir: PathBuf, attempts: u32 },

    /// Filesystem or subprocess I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration validation error
    #[error("configuration error: {0}")]
    Config(#[from] IndexerConfigError),
}

impl IndexerError {
    /// Check whether this error represents explicit cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            budget,
        }
    }

    /// Create a malformed output error with context
    pub fn malformed_output(reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error with the captured diagnostic
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::Unauthorized {
            detail: detail.into(),
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum IndexerConfigError {
    /// Missing required configuration field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid path format or value
    #[error("Invalid path: {path} - {reason}")]
    InvalidPath { path: String, reason: String },

    /// Invalid timeout value
    #[error("Invalid timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },

    /// Invalid output size cap
    #[error("Invalid output limit: {limit} - {reason}")]
    InvalidOutputLimit { limit: u64, reason: String },
}

impl IndexerConfigError {
    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid timeout error
    pub fn invalid_timeout(timeout: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            timeout,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_helpers() {
        let timeout = IndexerError::timeout("build", Duration::from_secs(600));
        assert!(matches!(timeout, IndexerError::Timeout { .. }));
        assert!(!timeout.is_cancelled());

        assert!(IndexerError::Cancelled.is_cancelled());

        let config_error = IndexerConfigError::missing_field("index_root");
        assert!(matches!(config_error, IndexerConfigError::MissingField { .. }));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = IndexerConfigError::missing_field("index_root");
        let indexer_error: IndexerError = config_error.into();
        assert!(matches!(indexer_error, IndexerError::Config(_)));

        let io_error = std::io::Error::other("boom");
        let indexer_error: IndexerError = io_error.into();
        assert!(matches!(indexer_error, IndexerError::Io(_)));
    }
}

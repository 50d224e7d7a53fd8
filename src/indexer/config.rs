//! Configuration for the external indexer executable
//!
//! Provides IndexerConfig with builder pattern and validation, covering the
//! indexer binary location, the on-disk index root, subprocess budgets and
//! the credentials forwarded to query subprocesses via the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::indexer::error::IndexerConfigError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default timeout for a full index build (10 minutes)
///
/// Builds walk and index an entire scope directory, so the budget is
/// generous; the subprocess is killed when it is exceeded.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

/// Default timeout for a single query (30 seconds)
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default cap on subprocess stdout (1 GiB)
///
/// Query result sets can be large; anything beyond this indicates a runaway
/// subprocess and is surfaced as an error rather than buffered further.
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 1024 * 1024 * 1024;

/// Environment variable capping the indexer's CPU parallelism
pub const CPU_COUNT_ENV: &str = "GOMAXPROCS";

/// Environment variable carrying the remote endpoint to query subprocesses
pub const ENDPOINT_ENV: &str = "KWINDEX_ENDPOINT";

/// Environment variable carrying the auth token to query subprocesses
///
/// Credentials travel via the environment only, never argv, so they cannot
/// leak through process listings.
pub const TOKEN_ENV: &str = "KWINDEX_TOKEN";

/// Environment variable overriding the indexer executable path
pub const INDEXER_PATH_ENV: &str = "KWINDEX_INDEXER_PATH";

/// Default indexer executable name, resolved via PATH
pub const DEFAULT_INDEXER_BINARY: &str = "kwindexer";

/// Resolve the indexer executable path from CLI args and environment
///
/// Priority: CLI arg > KWINDEX_INDEXER_PATH env var > "kwindexer" default
pub fn resolve_indexer_path(indexer_path_arg: Option<String>) -> String {
    indexer_path_arg
        .or_else(|| std::env::var(INDEXER_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_INDEXER_BINARY.to_string())
}

// ============================================================================
// Core Configuration Type
// ============================================================================

/// Complete configuration for driving the indexer executable
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Path to the indexer executable
    pub indexer_path: String,

    /// Root directory under which all indexes are stored
    pub index_root: PathBuf,

    /// Optional remote endpoint, exported to query subprocesses
    pub endpoint: Option<String>,

    /// Optional auth token, exported to query subprocesses
    pub auth_token: Option<String>,

    /// Budget for a full index build
    pub build_timeout: Duration,

    /// Budget for a single query or status invocation
    pub query_timeout: Duration,

    /// Cap on subprocess stdout size
    pub max_output_bytes: u64,
}

impl IndexerConfig {
    /// Create a configuration builder
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::new()
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for IndexerConfig with validation and defaults
#[derive(Debug, Default)]
pub struct IndexerConfigBuilder {
    indexer_path: Option<String>,
    index_root: Option<PathBuf>,
    endpoint: Option<String>,
    auth_token: Option<String>,
    build_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    max_output_bytes: Option<u64>,
}

impl IndexerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path to the indexer executable
    pub fn indexer_path(mut self, path: impl Into<String>) -> Self {
        self.indexer_path = Some(path.into());
        self
    }

    /// Set the root directory for all on-disk indexes
    pub fn index_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_root = Some(path.into());
        self
    }

    /// Set the remote endpoint forwarded to query subprocesses
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the auth token forwarded to query subprocesses
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the index build timeout
    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = Some(timeout);
        self
    }

    /// Set the query timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Set the cap on subprocess stdout size
    pub fn max_output_bytes(mut self, limit: u64) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<IndexerConfig, IndexerConfigError> {
        let index_root = self
            .index_root
            .ok_or_else(|| IndexerConfigError::missing_field("index_root"))?;

        let indexer_path = self
            .indexer_path
            .unwrap_or_else(|| resolve_indexer_path(None));

        let build_timeout = self
            .build_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS));
        let query_timeout = self
            .query_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS));
        let max_output_bytes = self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES);

        Self::validate_indexer_path(&indexer_path)?;
        Self::validate_index_root(&index_root)?;
        Self::validate_timeout(build_timeout, "build")?;
        Self::validate_timeout(query_timeout, "query")?;

        if max_output_bytes == 0 {
            return Err(IndexerConfigError::InvalidOutputLimit {
                limit: max_output_bytes,
                reason: "Output limit must be greater than zero".to_string(),
            });
        }

        Ok(IndexerConfig {
            indexer_path,
            index_root,
            endpoint: self.endpoint,
            auth_token: self.auth_token,
            build_timeout,
            query_timeout,
            max_output_bytes,
        })
    }

    /// Validate the indexer executable path
    fn validate_indexer_path(indexer_path: &str) -> Result<(), IndexerConfigError> {
        if indexer_path.is_empty() {
            return Err(IndexerConfigError::invalid_path(
                indexer_path,
                "Indexer path cannot be empty",
            ));
        }

        if indexer_path.contains('\0') {
            return Err(IndexerConfigError::invalid_path(
                indexer_path,
                "Indexer path contains null character",
            ));
        }

        // Existence is not checked here: the binary may be resolved via PATH
        // or installed between configuration and first use.

        Ok(())
    }

    /// Validate the index root path
    fn validate_index_root(index_root: &Path) -> Result<(), IndexerConfigError> {
        if index_root.as_os_str().is_empty() {
            return Err(IndexerConfigError::invalid_path(
                index_root.to_string_lossy(),
                "Index root cannot be empty",
            ));
        }

        Ok(())
    }

    /// Validate a timeout value
    fn validate_timeout(timeout: Duration, operation: &str) -> Result<(), IndexerConfigError> {
        if timeout.is_zero() {
            return Err(IndexerConfigError::invalid_timeout(
                timeout,
                format!("{operation} timeout must be greater than zero"),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

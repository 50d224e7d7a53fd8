//! Query subprocess management
//!
//! Runs the indexer's `query` subcommand against a published index and
//! parses its JSON output. Credentials travel via the environment only.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::index::paths::IndexLocations;
use crate::indexer::config::{ENDPOINT_ENV, IndexerConfig, TOKEN_ENV};
use crate::indexer::error::IndexerError;
use crate::indexer::process::{self, IndexerInvocation};
use crate::indexer::results::{SearchHit, parse_hits};

/// Runs keyword queries by spawning the indexer's `query` subcommand
#[derive(Debug, Clone)]
pub struct IndexQuerier {
    config: Arc<IndexerConfig>,
}

impl IndexQuerier {
    pub fn new(config: Arc<IndexerConfig>) -> Self {
        Self { config }
    }

    /// Query the published index for `scope_dir` with an expanded query
    ///
    /// Non-zero exit, timeout or oversized output is terminal for this call
    /// only; an unauthorized diagnostic on stderr maps to its own error so
    /// callers can surface the right remediation.
    pub async fn query(
        &self,
        locations: &IndexLocations,
        scope_dir: &Path,
        expanded_query: &str,
    ) -> Result<Vec<SearchHit>, IndexerError> {
        let mut envs = Vec::new();
        if let Some(token) = &self.config.auth_token {
            envs.push((TOKEN_ENV.to_string(), token.clone()));
        }
        if let Some(endpoint) = &self.config.endpoint {
            envs.push((ENDPOINT_ENV.to_string(), endpoint.clone()));
        }

        let invocation = IndexerInvocation {
            program: self.config.indexer_path.clone(),
            args: vec![
                "--index-root".to_string(),
                locations.index_dir.to_string_lossy().into_owned(),
                "query".to_string(),
                "--scopes".to_string(),
                scope_dir.to_string_lossy().into_owned(),
                "--fmt".to_string(),
                "json".to_string(),
                expanded_query.to_string(),
            ],
            envs,
            timeout: self.config.query_timeout,
            max_output_bytes: self.config.max_output_bytes,
            operation: "query",
        };

        // Queries have no external cancellation; the timeout bounds them
        let cancel = CancellationToken::new();
        let output = process::run(invocation, &cancel).await?;

        if !output.status.success() {
            if is_unauthorized(&output.stderr) {
                return Err(IndexerError::unauthorized(output.stderr.trim().to_string()));
            }
            return Err(IndexerError::QueryFailed {
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        let hits = parse_hits(&output.stdout)?;
        debug!(
            "Query against {} returned {} hits",
            scope_dir.display(),
            hits.len()
        );
        Ok(hits)
    }
}

/// Detect an unauthorized diagnostic in subprocess stderr
fn is_unauthorized(stderr: &str) -> bool {
    stderr.contains("401") || stderr.to_ascii_lowercase().contains("unauthorized")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeIndexer;

    #[test]
    fn test_is_unauthorized() {
        assert!(is_unauthorized("server returned 401"));
        assert!(is_unauthorized("error: Unauthorized token"));
        assert!(!is_unauthorized("index shard corrupt"));
    }

    #[tokio::test]
    async fn test_query_parses_hits() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_query_output(
            r#"[{"fqname":"pkg.f","name":"f","type":"function","doc":"","exported":true,
                 "lang":"go","file":"/repo/a.go","summary":"func f()",
                 "range":{"startByte":0,"endByte":9,
                          "startPoint":{"row":0,"col":0},"endPoint":{"row":0,"col":9}}}]"#,
        );
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let querier = IndexQuerier::new(Arc::clone(&config));

        let scope = Path::new("/repo");
        let locations = IndexLocations::resolve(&config.index_root, scope);
        let hits = querier.query(&locations, scope, "f").await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fqname, "pkg.f");
    }

    #[tokio::test]
    async fn test_query_targets_published_index_dir() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let querier = IndexQuerier::new(Arc::clone(&config));

        let scope = Path::new("/repo");
        let locations = IndexLocations::resolve(&config.index_root, scope);
        querier.query(&locations, scope, "foo bar").await.unwrap();

        let invocation = fake.invocations().pop().unwrap();
        assert!(invocation.contains(&locations.index_dir.to_string_lossy().into_owned()));
        assert!(invocation.contains("--fmt json"));
        assert!(invocation.contains("foo bar"));
    }

    #[tokio::test]
    async fn test_query_unauthorized() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_query_failure("remote rejected request: 401 unauthorized");
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let querier = IndexQuerier::new(Arc::clone(&config));

        let scope = Path::new("/repo");
        let locations = IndexLocations::resolve(&config.index_root, scope);
        let result = querier.query(&locations, scope, "f").await;

        assert!(matches!(result, Err(IndexerError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_query_generic_failure() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_query_failure("index shard corrupt");
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let querier = IndexQuerier::new(Arc::clone(&config));

        let scope = Path::new("/repo");
        let locations = IndexLocations::resolve(&config.index_root, scope);
        let result = querier.query(&locations, scope, "f").await;

        assert!(matches!(result, Err(IndexerError::QueryFailed { .. })));
    }

    #[tokio::test]
    async fn test_query_malformed_output() {
        let temp = tempfile::tempdir().unwrap();
        let fake = FakeIndexer::install(temp.path());
        fake.set_query_output("definitely not json");
        let config = Arc::new(fake.config(&temp.path().join("indexes")));
        let querier = IndexQuerier::new(Arc::clone(&config));

        let scope = Path::new("/repo");
        let locations = IndexLocations::resolve(&config.index_root, scope);
        let result = querier.query(&locations, scope, "f").await;

        assert!(matches!(result, Err(IndexerError::MalformedOutput { .. })));
    }
}

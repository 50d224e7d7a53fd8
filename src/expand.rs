//! Query expansion collaborator seam
//!
//! Raw keyword queries pass through an expansion service before reaching
//! the indexer. The service is a black box with its own failure mode; the
//! default implementation passes queries through unchanged.

use async_trait::async_trait;

use crate::indexer::error::IndexerError;

/// Expands a raw keyword query into the form the indexer searches with
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<String, IndexerError>;
}

/// Pass-through expander used when no expansion service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityExpander;

#[async_trait]
impl QueryExpander for IdentityExpander {
    async fn expand(&self, query: &str) -> Result<String, IndexerError> {
        Ok(query.to_string())
    }
}

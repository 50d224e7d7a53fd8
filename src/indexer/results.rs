//! Search hit types returned by the indexer's `query` subcommand
//!
//! The indexer prints a JSON array of hits on stdout; these types mirror
//! that wire shape (camelCase keys, byte offsets plus row/col points).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::indexer::error::IndexerError;

/// A row/column position inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPoint {
    pub row: u32,
    pub col: u32,
}

/// Byte and point extent of a matched symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRange {
    pub start_byte: u64,
    pub end_byte: u64,
    pub start_point: SearchPoint,
    pub end_point: SearchPoint,
}

/// A single keyword search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Fully qualified symbol name
    pub fqname: String,

    /// Short symbol name
    pub name: String,

    /// Symbol kind as reported by the indexer (function, class, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Attached documentation, if any
    #[serde(default)]
    pub doc: String,

    /// Whether the symbol is exported from its module
    #[serde(default)]
    pub exported: bool,

    /// Source language of the file containing the hit
    pub lang: String,

    /// File containing the hit
    pub file: PathBuf,

    /// One-line summary of the matched code
    #[serde(default)]
    pub summary: String,

    /// Extent of the hit within the file
    pub range: SearchRange,
}

/// Parse the raw stdout of a `query` invocation into hits
pub fn parse_hits(stdout: &str) -> Result<Vec<SearchHit>, IndexerError> {
    serde_json::from_str(stdout).map_err(|e| {
        IndexerError::malformed_output(format!("query output is not a JSON hit array: {e}"))
    })
}

//! On-disk index locations derived from a scope directory
//!
//! Every scope directory maps deterministically to its published index
//! directory and build staging directory under the index root:
//!
//! ```text
//! <root>/<canonical-scope-path>/        published index
//! <root>/.tmp/<canonical-scope-path>/   build staging
//! <root>/.trash/<name>-<timestamp>/     pending deletion
//! <root>/.failed/<escaped-scope-path>   failure sentinel
//! ```
//!
//! The canonical form collapses platform spellings of the same directory
//! (notably Windows drive-letter segments, raw and percent-encoded) so one
//! scope directory never ends up with two indexes.

use std::path::{Path, PathBuf};

/// Marker file whose presence defines "an index exists here"
pub const INDEX_MARKER_FILE: &str = "index.json";

/// Subdirectory of the index root used for build staging
pub const TMP_SUBDIR: &str = ".tmp";

/// Subdirectory of the index root holding indexes pending deletion
pub const TRASH_SUBDIR: &str = ".trash";

/// Subdirectory of the index root holding failure sentinels
pub const FAILED_SUBDIR: &str = ".failed";

/// Resolved storage locations for one scope directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocations {
    /// Canonical scope path, the key for locks and sentinels
    pub canonical_key: String,

    /// Published index directory
    pub index_dir: PathBuf,

    /// Build staging directory; renamed onto `index_dir` on success
    pub tmp_dir: PathBuf,
}

impl IndexLocations {
    /// Resolve the storage locations for a scope directory
    pub fn resolve(index_root: &Path, scope_dir: &Path) -> Self {
        let canonical_key = canonical_scope_key(scope_dir);
        let relative: PathBuf = canonical_key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        Self {
            index_dir: index_root.join(&relative),
            tmp_dir: index_root.join(TMP_SUBDIR).join(&relative),
            canonical_key,
        }
    }

    /// Path of the marker file defining index existence
    pub fn index_marker(&self) -> PathBuf {
        self.index_dir.join(INDEX_MARKER_FILE)
    }

    /// Check whether a published index exists on disk
    pub async fn index_exists(&self) -> bool {
        tokio::fs::try_exists(self.index_marker())
            .await
            .unwrap_or(false)
    }

    /// Flat filename form of the canonical key, for sentinel files
    pub fn escaped_name(&self) -> String {
        escape_flat(&self.canonical_key)
    }
}

/// Canonicalize a scope directory path into its index key
///
/// Backslashes normalize to forward slashes; a drive-letter segment (`c:`
/// or its percent-encoded spelling `c%3A`) collapses to the bare letter.
pub fn canonical_scope_key(scope_dir: &Path) -> String {
    let raw = scope_dir.to_string_lossy().replace('\\', "/");
    raw.split('/')
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_segment(segment: &str) -> String {
    if let Some(letter) = segment.strip_suffix(':')
        && letter.len() == 1
        && letter.chars().all(|c| c.is_ascii_alphabetic())
    {
        return letter.to_string();
    }

    if segment.len() == 4 {
        let (letter, suffix) = segment.split_at(1);
        if letter.chars().all(|c| c.is_ascii_alphabetic()) && suffix.eq_ignore_ascii_case("%3a") {
            return letter.to_string();
        }
    }

    segment.to_string()
}

/// Escape a canonical key into a single flat filename
///
/// Percent-style: `%` first, then both separator forms, so the mapping is
/// injective and reversible.
pub fn escape_flat(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' | '\\' => escaped.push_str("%2F"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================

//! File discovery by glob pattern.
//!
//! ```no_run
//! use ironline::glob::expand_glob;
//!
//! // Every log under a dated partition directory
//! let files = expand_glob("logs/2024-*/*.log")?;
//! # Ok::<(), ironline::LoaderError>(())
//! ```

use crate::error::{LoaderError, Result};
use std::path::PathBuf;

/// Expand a glob pattern into a sorted vector of matching files.
///
/// Directories are skipped. Supports `*`, `?`, `**`, `[abc]` and `[!abc]`.
/// No match yields an empty vector.
///
/// # Errors
///
/// Returns [`LoaderError::Glob`] for an invalid pattern or when a directory
/// on the way cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = ::glob::glob(pattern)
        .map_err(|e| LoaderError::Glob(format!("invalid glob pattern {pattern}: {e}")))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            LoaderError::Glob(format!("error reading glob entry for {pattern}: {e}"))
        })?;
        if path.is_file() {
            result.push(path);
        }
    }

    // Deterministic registration order
    result.sort();
    Ok(result)
}

//! Loader configuration.
//!
//! ```
//! use ironline::LoaderConfig;
//!
//! let config = LoaderConfig::from_json_str(r#"{ "max_job_count": 2, "encoding": "latin1" }"#)?;
//! assert_eq!(config.max_job_count, 2);
//! assert_eq!(config.block_size, ironline::config::DEFAULT_BLOCK_SIZE);
//! # Ok::<(), ironline::LoaderError>(())
//! ```

use crate::encoding::{self, EncodingRef};
use crate::error::{LoaderError, Result};
use crate::pool::WORKER_ID_SPACE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Smallest accepted block size; holds any built-in byte-order mark.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Tunables for a [`FileLoader`](crate::FileLoader).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of concurrently running activations (> 0).
    pub max_job_count: usize,
    /// Bytes decoded per step; clamped to [`MIN_BLOCK_SIZE`].
    pub block_size: usize,
    /// Default encoding label for files without an override.
    pub encoding: String,
    /// Fixed size of the background pool. When unset the pool has
    /// `max_job_count + 1` threads and grows with the cap.
    pub worker_threads: Option<usize>,
    /// Transparently decompress `.gz`/`.zst`/`.bz2`/`.xz` files.
    pub decompress: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_job_count: num_cpus::get().max(1),
            block_size: DEFAULT_BLOCK_SIZE,
            encoding: "utf-8".to_string(),
            worker_threads: None,
            decompress: true,
        }
    }
}

impl LoaderConfig {
    /// Parse a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LoaderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Config`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Check value ranges and that the encoding label is known.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Config`] or [`LoaderError::UnknownEncoding`].
    pub fn validate(&self) -> Result<()> {
        check_max_job_count(self.max_job_count)?;
        if self.worker_threads == Some(0) {
            return Err(LoaderError::Config("worker_threads must be > 0".into()));
        }
        self.resolve_encoding()?;
        Ok(())
    }

    /// Block size after clamping.
    #[must_use]
    pub fn effective_block_size(&self) -> usize {
        clamp_block_size(self.block_size)
    }

    /// Resolve [`encoding`](Self::encoding) through the encoding registry.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownEncoding`] for unregistered labels.
    pub fn resolve_encoding(&self) -> Result<EncodingRef> {
        encoding::for_label(&self.encoding)
            .ok_or_else(|| LoaderError::UnknownEncoding(self.encoding.clone()))
    }
}

pub(crate) fn check_max_job_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(LoaderError::Config("max_job_count must be > 0".into()));
    }
    if count > WORKER_ID_SPACE {
        return Err(LoaderError::Config(format!(
            "max_job_count must be <= {WORKER_ID_SPACE}"
        )));
    }
    Ok(())
}

pub(crate) fn clamp_block_size(size: usize) -> usize {
    size.max(MIN_BLOCK_SIZE)
}

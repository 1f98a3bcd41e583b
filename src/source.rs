//! Raw byte sources.
//!
//! A [`ByteSource`] fills a worker-owned buffer with a file's complete
//! contents. Workers call it from the background pool, never from the
//! thread driving [`FileLoader::update`](crate::FileLoader::update).

use crate::compression::auto_detect_reader;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads raw file bytes for the pipeline.
pub trait ByteSource: Send + Sync {
    /// Append the full contents of `path` to `buf`.
    ///
    /// `buf` arrives empty; its allocation is reused across activations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    fn read_to_end(&self, path: &Path, buf: &mut Vec<u8>) -> Result<()>;
}

/// Reads files from the local filesystem.
#[derive(Clone, Copy, Debug)]
pub struct FsByteSource {
    decompress: bool,
}

impl FsByteSource {
    /// Source that transparently decompresses recognized formats.
    #[must_use]
    pub fn new() -> Self {
        Self { decompress: true }
    }

    /// Source that hands file bytes through untouched.
    #[must_use]
    pub fn raw() -> Self {
        Self { decompress: false }
    }

    #[must_use]
    pub fn with_decompression(decompress: bool) -> Self {
        Self { decompress }
    }
}

impl Default for FsByteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for FsByteSource {
    fn read_to_end(&self, path: &Path, buf: &mut Vec<u8>) -> Result<()> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        if self.decompress {
            let mut rdr = auto_detect_reader(file, path)
                .with_context(|| format!("setup decompression for {}", path.display()))?;
            rdr.read_to_end(buf)
                .with_context(|| format!("read {}", path.display()))?;
        } else {
            if let Ok(meta) = file.metadata() {
                buf.reserve(usize::try_from(meta.len()).unwrap_or(0));
            }
            let mut file = file;
            file.read_to_end(buf)
                .with_context(|| format!("read {}", path.display()))?;
        }
        Ok(())
    }
}

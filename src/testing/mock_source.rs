//! In-memory [`ByteSource`] for tests.

use crate::source::ByteSource;
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

enum MockFile {
    Bytes(Vec<u8>),
    Fail(String),
}

#[derive(Default)]
struct Files {
    contents: HashMap<PathBuf, MockFile>,
    reads: HashMap<PathBuf, usize>,
}

struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
    waiting: Mutex<usize>,
}

/// Cloneable handle to a shared set of in-memory files.
///
/// Clones share state, so a test can hand one clone to the loader and keep
/// another to add files, count reads or operate the gate.
#[derive(Clone)]
pub struct MockByteSource {
    files: Arc<Mutex<Files>>,
    gate: Arc<Gate>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockByteSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(Files::default())),
            gate: Arc::new(Gate {
                closed: Mutex::new(false),
                changed: Condvar::new(),
                waiting: Mutex::new(0),
            }),
        }
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl AsRef<Path>, bytes: impl Into<Vec<u8>>) {
        lock(&self.files)
            .contents
            .insert(path.as_ref().to_path_buf(), MockFile::Bytes(bytes.into()));
    }

    pub fn insert_text(&self, path: impl AsRef<Path>, text: &str) {
        self.insert(path, text.as_bytes());
    }

    /// Make every read of `path` fail with `message`.
    pub fn fail(&self, path: impl AsRef<Path>, message: &str) {
        lock(&self.files).contents.insert(
            path.as_ref().to_path_buf(),
            MockFile::Fail(message.to_string()),
        );
    }

    /// Number of reads attempted for `path`.
    #[must_use]
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        lock(&self.files)
            .reads
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Reads attempted across all paths.
    #[must_use]
    pub fn total_reads(&self) -> usize {
        lock(&self.files).reads.values().sum()
    }

    /// Hold every subsequent read until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        *lock(&self.gate.closed) = true;
    }

    /// Release held reads.
    pub fn open_gate(&self) {
        *lock(&self.gate.closed) = false;
        self.gate.changed.notify_all();
    }

    /// Reads currently held at the gate.
    #[must_use]
    pub fn waiting(&self) -> usize {
        *lock(&self.gate.waiting)
    }

    fn pass_gate(&self) {
        let mut closed = lock(&self.gate.closed);
        if !*closed {
            return;
        }
        *lock(&self.gate.waiting) += 1;
        while *closed {
            closed = self
                .gate
                .changed
                .wait(closed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *lock(&self.gate.waiting) -= 1;
    }
}

impl Default for MockByteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for MockByteSource {
    fn read_to_end(&self, path: &Path, buf: &mut Vec<u8>) -> Result<()> {
        *lock(&self.files)
            .reads
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
        self.pass_gate();

        let files = lock(&self.files);
        match files.contents.get(path) {
            Some(MockFile::Bytes(bytes)) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Some(MockFile::Fail(message)) => bail!("{}: {message}", path.display()),
            None => bail!("{}: no such mock file", path.display()),
        }
    }
}

//! Append-only character storage addressed by generation-checked handles.
//!
//! The streaming decoder writes decoded text into a [`CharArena`] and emits
//! [`LineRef`]s, plain `(generation, offset, length)` triples, instead of
//! borrowed slices. Every mutation of the arena bumps its generation, so a
//! `LineRef` kept across a mutation is rejected by [`CharArena::get`] with
//! [`LoaderError::StaleLine`] rather than resolving to unrelated text.

use crate::error::{LoaderError, Result};

/// Handle to a run of chars stored in a [`CharArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineRef {
    generation: u64,
    start: usize,
    len: usize,
}

impl LineRef {
    /// Arena generation this line was produced in.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Length of the line in bytes (UTF-8).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Growable, append-only text buffer with a monotonically increasing version.
#[derive(Debug, Default)]
pub struct CharArena {
    buf: String,
    generation: u64,
}

impl CharArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            generation: 0,
        }
    }

    /// Current generation; changes on every mutation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Append `text` at the end.
    pub fn append(&mut self, text: &str) {
        self.append_with(|buf| buf.push_str(text));
    }

    /// Append through a writer closure (used by char decoders that push
    /// directly into the buffer).
    pub fn append_with<F: FnOnce(&mut String)>(&mut self, write: F) {
        write(&mut self.buf);
        self.generation += 1;
    }

    /// Drop everything before byte offset `from`, keeping the tail.
    ///
    /// `from` is clamped to the buffer length; it must fall on a char boundary,
    /// which holds for every offset the decoder hands out.
    pub fn retain_from(&mut self, from: usize) {
        let from = from.min(self.buf.len());
        if from > 0 {
            self.buf.drain(..from);
        }
        self.generation += 1;
    }

    /// Remove all text.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.generation += 1;
    }

    /// Reference `len` bytes starting at `start` in the current generation.
    pub(crate) fn line(&self, start: usize, len: usize) -> LineRef {
        debug_assert!(start + len <= self.buf.len());
        LineRef {
            generation: self.generation,
            start,
            len,
        }
    }

    /// Resolve a line handle.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::StaleLine`] if the arena was mutated after the
    /// handle was produced.
    pub fn get(&self, line: LineRef) -> Result<&str> {
        if line.generation != self.generation {
            return Err(LoaderError::StaleLine {
                line: line.generation,
                current: self.generation,
            });
        }
        self.buf
            .get(line.start..line.start + line.len)
            .ok_or(LoaderError::StaleLine {
                line: line.generation,
                current: self.generation,
            })
    }
}

//! Block-wise text decoding and line splitting.
//!
//! [`StreamingDecoder`] turns a file's bytes, fed one block at a time, into
//! complete lines. Line terminators are `\n`, `\r` and `\r\n`; empty lines are
//! not emitted. The split is independent of where block boundaries fall:
//!
//! - a trailing run with no terminator yet is carried into the next block;
//! - a `\r` that ends a block terminates its line, and a `\n` opening the next
//!   block is then dropped as the second half of that `\r\n`;
//! - bytes of a multi-byte char split across blocks are held by the
//!   encoding's [`CharDecoder`] until complete.
//!
//! ```
//! use ironline::decoder::StreamingDecoder;
//! use ironline::encoding;
//!
//! let mut dec = StreamingDecoder::new(encoding::utf8());
//! let mut lines = Vec::new();
//! for block in [&b"A\r"[..], &b"\nB\r"[..]] {
//!     for line in dec.decode_block(block).iter() {
//!         lines.push(line?.to_string());
//!     }
//! }
//! for line in dec.finish().iter() {
//!     lines.push(line?.to_string());
//! }
//! assert_eq!(lines, ["A", "B"]);
//! # Ok::<(), ironline::LoaderError>(())
//! ```

use crate::arena::{CharArena, LineRef};
use crate::encoding::{CharDecoder, EncodingRef};
use crate::error::Result;

/// State carried from one block to the next within a single activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContinuationState {
    /// Bytes of decoded text after the last terminator, not yet emitted.
    pub leftover: usize,
    /// The previous block ended in `\r`; a leading `\n` must be skipped.
    pub pending_cr: bool,
    /// The byte-order mark check has been done for this activation.
    pub bom_checked: bool,
}

/// Lines produced by one decoding step, resolved against the decoder's arena.
pub struct DecodedLines<'a> {
    arena: &'a CharArena,
    lines: &'a [LineRef],
}

impl<'a> DecodedLines<'a> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Raw handles of the produced lines.
    #[must_use]
    pub fn refs(&self) -> &'a [LineRef] {
        self.lines
    }

    /// Iterate the produced lines as text.
    pub fn iter(&self) -> impl Iterator<Item = Result<&'a str>> + 'a {
        let arena = self.arena;
        self.lines.iter().map(move |line| arena.get(*line))
    }
}

/// Incremental decoder for one file at a time; reset between activations.
pub struct StreamingDecoder {
    encoding: EncodingRef,
    chars: Box<dyn CharDecoder>,
    arena: CharArena,
    lines: Vec<LineRef>,
    consumed: usize,
    state: ContinuationState,
}

impl StreamingDecoder {
    #[must_use]
    pub fn new(encoding: EncodingRef) -> Self {
        let chars = encoding.new_decoder();
        Self {
            encoding,
            chars,
            arena: CharArena::new(),
            lines: Vec::new(),
            consumed: 0,
            state: ContinuationState::default(),
        }
    }

    /// Encoding currently in use.
    #[must_use]
    pub fn encoding(&self) -> &EncodingRef {
        &self.encoding
    }

    /// Snapshot of the carried state.
    #[must_use]
    pub fn continuation(&self) -> ContinuationState {
        self.state
    }

    /// The arena holding the text of the most recently produced lines.
    #[must_use]
    pub fn arena(&self) -> &CharArena {
        &self.arena
    }

    /// Forget all carried state and switch to `encoding`, keeping allocations.
    pub fn reset(&mut self, encoding: &EncodingRef) {
        self.encoding = EncodingRef::clone(encoding);
        self.chars = self.encoding.new_decoder();
        self.arena.clear();
        self.lines.clear();
        self.consumed = 0;
        self.state = ContinuationState::default();
    }

    /// Decode one block and split out every line it completes.
    pub fn decode_block(&mut self, bytes: &[u8]) -> DecodedLines<'_> {
        self.lines.clear();
        self.arena.retain_from(self.consumed);
        self.consumed = 0;
        let carried = self.arena.len();

        let mut bytes = bytes;
        if !self.state.bom_checked {
            self.state.bom_checked = true;
            let preamble = self.encoding.preamble();
            if !preamble.is_empty() && bytes.starts_with(preamble) {
                bytes = &bytes[preamble.len()..];
            }
        }

        let chars = &mut self.chars;
        self.arena.append_with(|buf| chars.decode(bytes, buf));

        let text = self.arena.as_str().as_bytes();
        let mut pos = carried;
        let mut line_start = 0;
        if self.state.pending_cr && pos < text.len() {
            // A carried `\r` always ends a block, so nothing was carried with it.
            if text[pos] == b'\n' {
                pos += 1;
                line_start = pos;
            }
            self.state.pending_cr = false;
        }

        while pos < text.len() {
            match text[pos] {
                b'\n' => {
                    push_line(&self.arena, &mut self.lines, line_start, pos);
                    pos += 1;
                }
                b'\r' => {
                    push_line(&self.arena, &mut self.lines, line_start, pos);
                    pos += 1;
                    if pos == text.len() {
                        self.state.pending_cr = true;
                    } else if text[pos] == b'\n' {
                        pos += 1;
                    }
                }
                _ => {
                    pos += 1;
                    continue;
                }
            }
            line_start = pos;
        }

        self.consumed = line_start;
        self.state.leftover = text.len() - line_start;
        DecodedLines {
            arena: &self.arena,
            lines: &self.lines,
        }
    }

    /// End of stream: flush the char decoder and emit the carried run as a
    /// final line.
    pub fn finish(&mut self) -> DecodedLines<'_> {
        self.lines.clear();
        self.arena.retain_from(self.consumed);
        let chars = &mut self.chars;
        self.arena.append_with(|buf| chars.finish(buf));

        // Flushed chars are replacement chars only, never a `\n`.
        self.state.pending_cr = false;
        let end = self.arena.len();
        push_line(&self.arena, &mut self.lines, 0, end);

        self.consumed = end;
        self.state.leftover = 0;
        DecodedLines {
            arena: &self.arena,
            lines: &self.lines,
        }
    }
}

fn push_line(arena: &CharArena, lines: &mut Vec<LineRef>, start: usize, end: usize) {
    if end > start {
        lines.push(arena.line(start, end - start));
    }
}

/// Decode `bytes` in blocks of `block_size` and collect every line.
///
/// Convenience for tools and tests; the loader drives [`StreamingDecoder`]
/// directly.
///
/// # Errors
///
/// Only fails on an internal arena invariant violation.
pub fn split_lines(encoding: &EncodingRef, bytes: &[u8], block_size: usize) -> Result<Vec<String>> {
    let mut decoder = StreamingDecoder::new(EncodingRef::clone(encoding));
    let mut out = Vec::new();
    for block in bytes.chunks(block_size.max(1)) {
        for line in decoder.decode_block(block).iter() {
            out.push(line?.to_string());
        }
    }
    for line in decoder.finish().iter() {
        out.push(line?.to_string());
    }
    Ok(out)
}

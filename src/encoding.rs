//! Pluggable text encodings for the streaming decoder.
//!
//! A [`TextEncoding`] describes one encoding (its labels and byte-order mark)
//! and hands out stateful [`CharDecoder`]s. A decoder must tolerate byte
//! sequences split anywhere across calls: incomplete trailing sequences are
//! held back until the next call, or replaced with U+FFFD by
//! [`CharDecoder::finish`] at end of stream.
//!
//! ## Built-in encodings
//! - **UTF-8** (`utf-8`, `utf8`) - lossy, BOM `EF BB BF`
//! - **UTF-16LE** (`utf-16le`, `utf-16`) - BOM `FF FE`
//! - **UTF-16BE** (`utf-16be`) - BOM `FE FF`
//! - **Latin-1** (`latin1`, `iso-8859-1`) - one char per byte, no BOM
//!
//! Custom encodings can be added to the global registry with
//! [`register_encoding`] and are then resolvable by label through
//! [`for_label`], which is what [`LoaderConfig`](crate::LoaderConfig) uses.

use std::char::REPLACEMENT_CHARACTER;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to an encoding.
pub type EncodingRef = Arc<dyn TextEncoding>;

/// Describes a text encoding.
pub trait TextEncoding: Send + Sync {
    /// Canonical name, e.g. `"utf-8"`.
    fn name(&self) -> &str;

    /// Lowercase labels this encoding answers to in [`for_label`].
    fn labels(&self) -> &[&str];

    /// Byte-order mark skipped at the very start of a file (may be empty).
    fn preamble(&self) -> &[u8];

    /// Create a fresh decoder with empty state.
    fn new_decoder(&self) -> Box<dyn CharDecoder>;
}

impl fmt::Debug for dyn TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextEncoding({})", self.name())
    }
}

/// Stateful bytes-to-chars decoder.
pub trait CharDecoder: Send {
    /// Decode `bytes`, appending the chars to `out`. Trailing bytes that do not
    /// yet form a complete char are kept for the next call.
    fn decode(&mut self, bytes: &[u8], out: &mut String);

    /// Flush held bytes at end of stream, appending U+FFFD for each
    /// incomplete sequence.
    fn finish(&mut self, out: &mut String);
}

static ENCODING_REGISTRY: RwLock<Option<Vec<EncodingRef>>> = RwLock::new(None);

fn builtin_encodings() -> Vec<EncodingRef> {
    vec![utf8(), utf16le(), utf16be(), latin1()]
}

/// Register a custom encoding globally.
///
/// Later registrations win over earlier ones (and over built-ins) when labels
/// overlap.
pub fn register_encoding(encoding: EncodingRef) {
    let mut lock = ENCODING_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(builtin_encodings).push(encoding);
}

/// Look up an encoding by label (case-insensitive).
#[must_use]
pub fn for_label(label: &str) -> Option<EncodingRef> {
    let wanted = label.trim().to_ascii_lowercase();
    let mut lock = ENCODING_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let registry = lock.get_or_insert_with(builtin_encodings);
    registry
        .iter()
        .rev()
        .find(|enc| enc.name() == wanted || enc.labels().contains(&wanted.as_str()))
        .cloned()
}

/// UTF-8.
#[must_use]
pub fn utf8() -> EncodingRef {
    Arc::new(Utf8)
}

/// UTF-16, little endian.
#[must_use]
pub fn utf16le() -> EncodingRef {
    Arc::new(Utf16 { big_endian: false })
}

/// UTF-16, big endian.
#[must_use]
pub fn utf16be() -> EncodingRef {
    Arc::new(Utf16 { big_endian: true })
}

/// ISO-8859-1.
#[must_use]
pub fn latin1() -> EncodingRef {
    Arc::new(Latin1)
}

// ============================================================================
// UTF-8
// ============================================================================

struct Utf8;

impl TextEncoding for Utf8 {
    fn name(&self) -> &str {
        "utf-8"
    }

    fn labels(&self) -> &[&str] {
        &["utf-8", "utf8"]
    }

    fn preamble(&self) -> &[u8] {
        &[0xEF, 0xBB, 0xBF]
    }

    fn new_decoder(&self) -> Box<dyn CharDecoder> {
        Box::new(Utf8Decoder::default())
    }
}

#[derive(Default)]
struct Utf8Decoder {
    held: Vec<u8>,
}

impl CharDecoder for Utf8Decoder {
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        let joined;
        let mut rest = if self.held.is_empty() {
            bytes
        } else {
            let mut buf = std::mem::take(&mut self.held);
            buf.extend_from_slice(bytes);
            joined = buf;
            &joined[..]
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.held = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self, out: &mut String) {
        if !self.held.is_empty() {
            self.held.clear();
            out.push(REPLACEMENT_CHARACTER);
        }
    }
}

// ============================================================================
// UTF-16
// ============================================================================

struct Utf16 {
    big_endian: bool,
}

impl TextEncoding for Utf16 {
    fn name(&self) -> &str {
        if self.big_endian { "utf-16be" } else { "utf-16le" }
    }

    fn labels(&self) -> &[&str] {
        if self.big_endian {
            &["utf-16be", "unicodefffe"]
        } else {
            &["utf-16le", "utf-16", "unicode"]
        }
    }

    fn preamble(&self) -> &[u8] {
        if self.big_endian { &[0xFE, 0xFF] } else { &[0xFF, 0xFE] }
    }

    fn new_decoder(&self) -> Box<dyn CharDecoder> {
        Box::new(Utf16Decoder {
            big_endian: self.big_endian,
            odd_byte: None,
            high_surrogate: None,
            units: Vec::new(),
        })
    }
}

struct Utf16Decoder {
    big_endian: bool,
    odd_byte: Option<u8>,
    high_surrogate: Option<u16>,
    units: Vec<u16>,
}

impl Utf16Decoder {
    fn unit(&self, a: u8, b: u8) -> u16 {
        if self.big_endian {
            u16::from_be_bytes([a, b])
        } else {
            u16::from_le_bytes([a, b])
        }
    }
}

impl CharDecoder for Utf16Decoder {
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.units.clear();
        if let Some(high) = self.high_surrogate.take() {
            self.units.push(high);
        }

        let mut bytes = bytes;
        if let Some(first) = self.odd_byte.take() {
            match bytes.split_first() {
                Some((&second, tail)) => {
                    let unit = self.unit(first, second);
                    self.units.push(unit);
                    bytes = tail;
                }
                None => {
                    self.odd_byte = Some(first);
                }
            }
        }

        let mut pairs = bytes.chunks_exact(2);
        for pair in pairs.by_ref() {
            let unit = self.unit(pair[0], pair[1]);
            self.units.push(unit);
        }
        if let [last] = pairs.remainder() {
            self.odd_byte = Some(*last);
        }

        if let Some(&last) = self.units.last()
            && (0xD800..=0xDBFF).contains(&last)
        {
            self.high_surrogate = Some(last);
            self.units.pop();
        }

        out.extend(
            char::decode_utf16(self.units.iter().copied())
                .map(|r| r.unwrap_or(REPLACEMENT_CHARACTER)),
        );
    }

    fn finish(&mut self, out: &mut String) {
        if self.high_surrogate.take().is_some() {
            out.push(REPLACEMENT_CHARACTER);
        }
        if self.odd_byte.take().is_some() {
            out.push(REPLACEMENT_CHARACTER);
        }
    }
}

// ============================================================================
// Latin-1
// ============================================================================

struct Latin1;

impl TextEncoding for Latin1 {
    fn name(&self) -> &str {
        "latin1"
    }

    fn labels(&self) -> &[&str] {
        &["latin1", "iso-8859-1", "l1"]
    }

    fn preamble(&self) -> &[u8] {
        &[]
    }

    fn new_decoder(&self) -> Box<dyn CharDecoder> {
        Box::new(Latin1Decoder)
    }
}

struct Latin1Decoder;

impl CharDecoder for Latin1Decoder {
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        out.extend(bytes.iter().map(|&b| char::from(b)));
    }

    fn finish(&mut self, _out: &mut String) {}
}

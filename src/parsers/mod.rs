//! Ready-made [`ParserCallback`](crate::ParserCallback) implementations.
//!
//! - [`LineCollector`]: keeps every line, optionally stopping after a limit
//! - [`JsonlParser`]: deserializes each line as JSON (feature `parsers-jsonl`)

pub mod lines;
#[cfg(feature = "parsers-jsonl")]
pub mod jsonl;

pub use lines::LineCollector;
#[cfg(feature = "parsers-jsonl")]
pub use jsonl::{JsonlParser, ParseFailure};

//! # Ironline
//!
//! A **non-blocking multi-file text loader** for Rust. Ironline reads many text
//! files in the background, decodes them block by block into lines and feeds
//! every line to a per-file parser, while the calling thread only ever runs
//! short, bounded scheduling ticks.
//!
//! ## Key Features
//!
//! - **Reference-counted loading** - files load on the first hold and unload on the last release
//! - **Bounded concurrency** - at most `max_job_count` activations run at once, the rest queue FIFO
//! - **Streaming decoding** - `\n`, `\r\n` and `\r` terminators, even when split across blocks
//! - **Pluggable parsers** - implement [`ParserCallback`] or use the ones in [`parsers`]
//! - **Encodings** - UTF-8, UTF-16LE/BE and Latin-1, with byte-order-mark handling
//! - **Transparent decompression** - gzip, zstd, bzip2 and xz (optional via feature flags)
//! - **Batched unloading** - parser teardown runs off the tick path
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironline::*;
//! use ironline::parsers::LineCollector;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut loader = FileLoader::new(LoaderConfig::default(), |_: &std::path::Path| {
//!     LineCollector::boxed()
//! })?;
//!
//! let idx = loader.add_file("README.md")?;
//! loader.load_file(idx)?;
//!
//! // Call once per frame (or whenever convenient); never blocks on I/O.
//! while loader.state(idx)?.status != ReadStatus::Completed {
//!     loader.update()?;
//! }
//!
//! let lines = loader.parser_as::<LineCollector>(idx)?.lines();
//! println!("{} lines", lines.len());
//!
//! loader.unload_file(idx)?;
//! loader.drain()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### FileLoader
//!
//! [`FileLoader`] owns the registered files and the worker pool. Requests are
//! queued with [`load_file`](FileLoader::load_file) and
//! [`unload_file`](FileLoader::unload_file) (also through a cloneable
//! [`RequestHandle`] from other threads) and applied by
//! [`update`](FileLoader::update) or [`run_all_jobs`](FileLoader::run_all_jobs).
//!
//! ### ReadState
//!
//! Each file moves through [`ReadStatus`]: `UnLoaded → ReadAsync → ParseText →
//! WaitForCallingComplete → Completed`, and back to `UnLoaded` once its last
//! hold is released. [`FileLoader::state`] returns a [`ReadState`] snapshot
//! with the status, block progress, reference count and phase timings.
//!
//! ### StreamingDecoder
//!
//! [`StreamingDecoder`] turns byte blocks into lines while carrying partial
//! lines, a trailing `\r` and the byte-order-mark check from block to block.
//!
//! ## Feature Flags
//!
//! - `parsers-jsonl` - [`parsers::JsonlParser`]
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//!
//! All are enabled by default.

pub mod arena;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod glob;
pub mod loader;
pub mod metrics;
pub mod parser;
pub mod parsers;
pub mod source;
pub mod state;
pub mod testing;

mod pool;
mod unload;
mod worker;

pub use arena::{CharArena, LineRef};
pub use config::LoaderConfig;
pub use decoder::{ContinuationState, DecodedLines, StreamingDecoder, split_lines};
pub use encoding::{EncodingRef, TextEncoding};
pub use error::{LoaderError, Result};
pub use loader::{FileLoader, FileLoaderBuilder, LoadAction, LoadRequest, RequestHandle};
pub use metrics::{LoaderMetrics, MetricsSnapshot};
pub use parser::{BoxedParser, ParserCallback, ParserFactory};
pub use pool::WORKER_ID_SPACE;
pub use source::{ByteSource, FsByteSource};
pub use state::{PhaseTimings, ReadState, ReadStatus};
pub use worker::WorkerId;

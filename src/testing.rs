//! Testing utilities for code built on [`FileLoader`](crate::FileLoader).
//!
//! - **Mock byte source**: [`MockByteSource`] serves in-memory files, counts
//!   reads, injects failures and can hold reads in flight behind a gate
//! - **Recording parser**: [`RecordingParser`] logs every callback it receives
//! - **Fixtures**: [`TempTextFiles`] and [`join_with_mixed_terminators`]
//!
//! # Quick Start
//!
//! ```
//! use ironline::FileLoader;
//! use ironline::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = MockByteSource::new();
//! source.insert_text("a.txt", "one\r\ntwo\rthree\n");
//!
//! let recorder = RecordingParser::new();
//! let mut loader = FileLoader::builder().byte_source(source.clone()).build()?;
//! let idx = loader.add_file_with_parser("a.txt", recorder.boxed())?;
//! loader.load_file(idx)?;
//! loader.drain()?;
//!
//! assert_eq!(recorder.lines(), ["one", "two", "three"]);
//! assert_eq!(source.read_count("a.txt"), 1);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod mock_source;
pub mod recording;

pub use fixtures::*;
pub use mock_source::*;
pub use recording::*;

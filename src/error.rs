//! Error types for the loader.
//!
//! [`LoaderError`] covers usage errors (reported synchronously to the caller)
//! and internal invariant violations. Malformed file content is not an error
//! here: parsers record it themselves and stop consumption by returning
//! `false` from [`ParserCallback::parse_line`](crate::ParserCallback::parse_line).

use crate::worker::WorkerId;
use thiserror::Error;

/// Errors raised by [`FileLoader`](crate::FileLoader) and its components.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("invalid file path: {0:?}")]
    InvalidPath(String),

    #[error("file index {index} out of range (loader holds {len} files)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unload of file {0} without a matching outstanding load")]
    UnbalancedUnload(usize),

    #[error("file {0} has an active job")]
    JobActive(usize),

    #[error("{0} jobs are still running; drain the loader first")]
    JobsRunning(usize),

    #[error("worker {0} started before its previous activation was joined")]
    WorkerNotJoined(WorkerId),

    #[error("worker {0} is not owned by the pool")]
    UnknownWorker(WorkerId),

    #[error("worker id space exhausted ({0} ids in use)")]
    WorkerIdsExhausted(usize),

    #[error("background task for worker {0} vanished before reporting completion")]
    WorkerLost(WorkerId),

    #[error("line from arena generation {line} used after the arena moved to generation {current}")]
    StaleLine { line: u64, current: u64 },

    #[error("parser for file {index} is not a {expected}")]
    ParserType { index: usize, expected: &'static str },

    #[error("unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("glob expansion failed: {0}")]
    Glob(String),

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result alias used across the crate.
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

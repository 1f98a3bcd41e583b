//! Loader execution counters.
//!
//! [`LoaderMetrics`] is a cheap, cloneable handle to a set of atomic counters
//! shared by the loader, its workers and the unload batch. Take a
//! [`MetricsSnapshot`] at any time to print it or save it as JSON.
//!
//! ```no_run
//! use ironline::{FileLoader, LoaderConfig};
//! use ironline::parsers::LineCollector;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut loader = FileLoader::builder()
//!     .config(LoaderConfig::default())
//!     .parser_factory(|_: &std::path::Path| LineCollector::boxed())
//!     .build()?;
//! let idx = loader.add_file("notes.txt")?;
//! loader.load_file(idx)?;
//! loader.drain()?;
//!
//! let snapshot = loader.metrics().snapshot();
//! snapshot.print();
//! snapshot.save_to_file("loader-metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    activations_started: AtomicU64,
    activations_completed: AtomicU64,
    loads_cancelled: AtomicU64,
    bytes_read: AtomicU64,
    lines_parsed: AtomicU64,
    parse_aborts: AtomicU64,
    read_failures: AtomicU64,
    worker_panics: AtomicU64,
    unload_batches: AtomicU64,
    files_unloaded: AtomicU64,
    workers_created: AtomicU64,
    workers_disposed: AtomicU64,
}

/// Shared handle to the loader's counters.
#[derive(Clone, Default)]
pub struct LoaderMetrics {
    inner: Arc<Counters>,
}

/// Serializable copy of all counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub activations_started: u64,
    pub activations_completed: u64,
    pub loads_cancelled: u64,
    pub bytes_read: u64,
    pub lines_parsed: u64,
    pub parse_aborts: u64,
    pub read_failures: u64,
    pub worker_panics: u64,
    pub unload_batches: u64,
    pub files_unloaded: u64,
    pub workers_created: u64,
    pub workers_disposed: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl LoaderMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn activation_started(&self) {
        bump(&self.inner.activations_started, 1);
    }

    pub(crate) fn activation_completed(&self) {
        bump(&self.inner.activations_completed, 1);
    }

    pub(crate) fn load_cancelled(&self) {
        bump(&self.inner.loads_cancelled, 1);
    }

    pub(crate) fn add_bytes(&self, bytes: usize) {
        bump(&self.inner.bytes_read, bytes as u64);
    }

    pub(crate) fn add_lines(&self, lines: u64) {
        bump(&self.inner.lines_parsed, lines);
    }

    pub(crate) fn parse_aborted(&self) {
        bump(&self.inner.parse_aborts, 1);
    }

    pub(crate) fn read_failed(&self) {
        bump(&self.inner.read_failures, 1);
    }

    pub(crate) fn worker_panicked(&self) {
        bump(&self.inner.worker_panics, 1);
    }

    pub(crate) fn unload_batch(&self, files: usize) {
        bump(&self.inner.unload_batches, 1);
        bump(&self.inner.files_unloaded, files as u64);
    }

    pub(crate) fn workers_created(&self, n: usize) {
        bump(&self.inner.workers_created, n as u64);
    }

    pub(crate) fn worker_disposed(&self) {
        bump(&self.inner.workers_disposed, 1);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        let get = |a: &AtomicU64| a.load(Ordering::Relaxed);
        MetricsSnapshot {
            activations_started: get(&c.activations_started),
            activations_completed: get(&c.activations_completed),
            loads_cancelled: get(&c.loads_cancelled),
            bytes_read: get(&c.bytes_read),
            lines_parsed: get(&c.lines_parsed),
            parse_aborts: get(&c.parse_aborts),
            read_failures: get(&c.read_failures),
            worker_panics: get(&c.worker_panics),
            unload_batches: get(&c.unload_batches),
            files_unloaded: get(&c.files_unloaded),
            workers_created: get(&c.workers_created),
            workers_disposed: get(&c.workers_disposed),
        }
    }
}

impl MetricsSnapshot {
    /// Counters as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Print all counters to stdout, sorted by name.
    pub fn print(&self) {
        println!("\n=========== Loader Metrics ===========");
        if let serde_json::Value::Object(map) = self.to_json() {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, value) in entries {
                println!("{name}: {value}");
            }
        }
        println!("======================================\n");
    }

    /// Save all counters to a pretty-printed JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let formatted = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

//! Per-file read state and activation timings.
//!
//! The live state of a file is a [`SharedReadState`] shared between the loader
//! and whichever worker is bound to the file. The worker advances the status
//! lock-free while the loader polls it; callers only ever see point-in-time
//! [`ReadState`] snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Where a file is in its load lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ReadStatus {
    /// No data loaded and no job bound.
    UnLoaded = 0,
    /// Raw bytes are being read.
    ReadAsync = 1,
    /// Blocks are being decoded and fed to the parser.
    ParseText = 2,
    /// Background work is done; waiting for the loader to reap the worker.
    WaitForCallingComplete = 3,
    /// Loaded; parsed data may be read.
    Completed = 4,
}

impl ReadStatus {
    /// `true` when no job is bound (`Completed` or `UnLoaded`).
    #[must_use]
    pub fn is_standby(self) -> bool {
        matches!(self, ReadStatus::Completed | ReadStatus::UnLoaded)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ReadStatus::ReadAsync,
            2 => ReadStatus::ParseText,
            3 => ReadStatus::WaitForCallingComplete,
            4 => ReadStatus::Completed,
            _ => ReadStatus::UnLoaded,
        }
    }
}

/// Wall-clock time spent in each phase of the last activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub read: Duration,
    pub parse: Duration,
    pub post_proc: Duration,
}

impl PhaseTimings {
    #[must_use]
    pub fn total(&self) -> Duration {
        self.read + self.parse + self.post_proc
    }
}

/// Point-in-time snapshot of a file's state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReadState {
    pub status: ReadStatus,
    pub block_count: usize,
    pub blocks_read: usize,
    pub ref_count: usize,
    pub timings: PhaseTimings,
    /// Read failure or parser panic of the last activation, if any.
    pub failure: Option<String>,
}

impl ReadState {
    #[must_use]
    pub fn is_standby(&self) -> bool {
        self.status.is_standby()
    }
}

#[derive(Default)]
struct Detail {
    timings: PhaseTimings,
    failure: Option<String>,
}

/// Live state of one file, shared with the bound worker.
pub(crate) struct SharedReadState {
    status: AtomicU8,
    block_count: AtomicUsize,
    blocks_read: AtomicUsize,
    detail: Mutex<Detail>,
}

impl SharedReadState {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(ReadStatus::UnLoaded as u8),
            block_count: AtomicUsize::new(0),
            blocks_read: AtomicUsize::new(0),
            detail: Mutex::new(Detail::default()),
        }
    }

    pub(crate) fn status(&self) -> ReadStatus {
        ReadStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: ReadStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Reset counters and timings for a new activation and enter `ReadAsync`.
    pub(crate) fn begin_activation(&self) {
        self.block_count.store(0, Ordering::Relaxed);
        self.blocks_read.store(0, Ordering::Relaxed);
        *self.detail() = Detail::default();
        self.set_status(ReadStatus::ReadAsync);
    }

    pub(crate) fn set_block_count(&self, count: usize) {
        self.block_count.store(count, Ordering::Relaxed);
    }

    pub(crate) fn block_done(&self) {
        self.blocks_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, elapsed: Duration) {
        self.detail().timings.read = elapsed;
    }

    pub(crate) fn record_parse(&self, elapsed: Duration) {
        self.detail().timings.parse = elapsed;
    }

    pub(crate) fn record_post_proc(&self, elapsed: Duration) {
        self.detail().timings.post_proc = elapsed;
    }

    pub(crate) fn record_failure(&self, failure: String) {
        self.detail().failure = Some(failure);
    }

    pub(crate) fn snapshot(&self, ref_count: usize) -> ReadState {
        let detail = self.detail();
        ReadState {
            status: self.status(),
            block_count: self.block_count.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            ref_count,
            timings: detail.timings,
            failure: detail.failure.clone(),
        }
    }

    fn detail(&self) -> std::sync::MutexGuard<'_, Detail> {
        self.detail.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lap timer for activation phases.
pub(crate) struct PhaseTimer {
    started: Instant,
}

impl PhaseTimer {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Elapsed time since start or the previous lap; restarts the timer.
    pub(crate) fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.started);
        self.started = now;
        elapsed
    }
}

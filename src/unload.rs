//! Batched parser release off the scheduler's tick path.
//!
//! Unloading can be far more expensive than the bookkeeping around it (a
//! parser may free large buffers), so the loader collects the files whose last
//! hold was released and runs all their [`ParserCallback::unload`] hooks as a
//! single background task. At most one batch runs at a time; targets that
//! arrive meanwhile wait for the next one.
//!
//! [`ParserCallback::unload`]: crate::ParserCallback::unload

use crate::metrics::LoaderMetrics;
use crate::parser::BoxedParser;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, error};

type Targets = Vec<(usize, BoxedParser)>;

#[derive(Default)]
pub(crate) struct UnloadBatch {
    queued: Targets,
    running: Option<Running>,
}

struct Running {
    indices: Vec<usize>,
    done: Receiver<Targets>,
}

/// Result of polling the running batch.
pub(crate) enum BatchPoll {
    Idle,
    Running,
    Finished(Targets),
    /// The task disappeared; its parsers are gone.
    Lost(Vec<usize>),
}

impl UnloadBatch {
    /// Queue a file's parser for the next batch.
    pub(crate) fn push(&mut self, index: usize, parser: BoxedParser) {
        self.queued.push((index, parser));
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) fn has_work(&self) -> bool {
        self.running.is_some() || !self.queued.is_empty()
    }

    /// Start a batch with everything queued, unless one is already running.
    pub(crate) fn launch(&mut self, threads: &rayon::ThreadPool, metrics: &LoaderMetrics) {
        if self.running.is_some() || self.queued.is_empty() {
            return;
        }
        let mut targets = std::mem::take(&mut self.queued);
        let indices: Vec<usize> = targets.iter().map(|(index, _)| *index).collect();
        debug!(files = indices.len(), "scheduling unload batch");
        metrics.unload_batch(indices.len());

        let (tx, rx) = mpsc::sync_channel(1);
        threads.spawn(move || {
            for (index, parser) in &mut targets {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| parser.unload()));
                if outcome.is_err() {
                    error!(index = *index, "parser panicked while unloading");
                }
            }
            let _ = tx.send(targets);
        });
        self.running = Some(Running { indices, done: rx });
    }

    /// Non-blocking check on the running batch.
    pub(crate) fn poll(&mut self) -> BatchPoll {
        let Some(running) = &self.running else {
            return BatchPoll::Idle;
        };
        match running.done.try_recv() {
            Ok(targets) => {
                self.running = None;
                BatchPoll::Finished(targets)
            }
            Err(TryRecvError::Empty) => BatchPoll::Running,
            Err(TryRecvError::Disconnected) => {
                let indices = self
                    .running
                    .take()
                    .map(|r| r.indices)
                    .unwrap_or_default();
                BatchPoll::Lost(indices)
            }
        }
    }

    /// Block until the running batch (if any) finishes.
    pub(crate) fn wait(&mut self) -> BatchPoll {
        let Some(running) = self.running.take() else {
            return BatchPoll::Idle;
        };
        match running.done.recv() {
            Ok(targets) => BatchPoll::Finished(targets),
            Err(_) => BatchPoll::Lost(running.indices),
        }
    }
}

//! Idle-worker pool with a bounded, cyclic id space.

use crate::encoding::EncodingRef;
use crate::error::{LoaderError, Result};
use crate::metrics::LoaderMetrics;
use crate::worker::{Worker, WorkerId};
use tracing::debug;

/// Number of distinct worker ids; also the hard ceiling on live workers.
pub const WORKER_ID_SPACE: usize = 1 << 16;

/// Hands out ids cyclically, skipping ids still in use.
pub(crate) struct IdSpace {
    in_use: Vec<bool>,
    next: usize,
    live: usize,
}

impl IdSpace {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            in_use: vec![false; capacity],
            next: 0,
            live: 0,
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn remaining(&self) -> usize {
        self.in_use.len() - self.live
    }

    pub(crate) fn acquire(&mut self) -> Result<WorkerId> {
        let capacity = self.in_use.len();
        for step in 0..capacity {
            let slot = (self.next + step) % capacity;
            if !self.in_use[slot] {
                self.in_use[slot] = true;
                self.next = (slot + 1) % capacity;
                self.live += 1;
                return Ok(slot as WorkerId);
            }
        }
        Err(LoaderError::WorkerIdsExhausted(self.live))
    }

    pub(crate) fn release(&mut self, id: WorkerId) -> Result<()> {
        match self.in_use.get_mut(id as usize) {
            Some(used) if *used => {
                *used = false;
                self.live -= 1;
                Ok(())
            }
            _ => Err(LoaderError::UnknownWorker(id)),
        }
    }
}

/// Workers not bound to any file, plus bookkeeping for all live workers.
pub(crate) struct WorkerPool {
    idle: Vec<Worker>,
    ids: IdSpace,
    metrics: LoaderMetrics,
}

impl WorkerPool {
    pub(crate) fn new(metrics: LoaderMetrics) -> Self {
        Self::with_id_space(WORKER_ID_SPACE, metrics)
    }

    pub(crate) fn with_id_space(capacity: usize, metrics: LoaderMetrics) -> Self {
        Self {
            idle: Vec::new(),
            ids: IdSpace::new(capacity),
            metrics,
        }
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Idle plus bound workers.
    pub(crate) fn live(&self) -> usize {
        self.ids.live()
    }

    /// How many more workers the id space can hold.
    pub(crate) fn headroom(&self) -> usize {
        self.ids.remaining()
    }

    /// Instantiate `count` new idle workers.
    pub(crate) fn grow(&mut self, count: usize, encoding: &EncodingRef) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        for _ in 0..count {
            let id = self.ids.acquire()?;
            self.idle.push(Worker::new(id, EncodingRef::clone(encoding)));
        }
        self.metrics.workers_created(count);
        debug!(added = count, live = self.live(), "grew worker pool");
        Ok(())
    }

    pub(crate) fn take_idle(&mut self) -> Option<Worker> {
        self.idle.pop()
    }

    /// Return a joined worker; disposed instead when `max_idle` workers are
    /// already pooled.
    pub(crate) fn give_back(&mut self, worker: Worker, max_idle: usize) -> Result<()> {
        if self.idle.len() < max_idle {
            self.idle.push(worker);
            return Ok(());
        }
        self.dispose(worker)
    }

    pub(crate) fn dispose(&mut self, worker: Worker) -> Result<()> {
        let id = worker.id();
        self.ids.release(id)?;
        self.metrics.worker_disposed();
        debug!(worker = id, live = self.live(), "disposed worker");
        Ok(())
    }

    /// Dispose idle workers beyond `max_idle`.
    pub(crate) fn shrink_to(&mut self, max_idle: usize) -> Result<()> {
        while self.idle.len() > max_idle {
            if let Some(worker) = self.idle.pop() {
                self.dispose(worker)?;
            }
        }
        Ok(())
    }
}

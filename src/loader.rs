//! The tick-driven file load/unload scheduler.
//!
//! [`FileLoader`] keeps one slot per registered file: its path, an optional
//! encoding override, its parser, its live [`ReadState`] and a reference
//! count of outstanding load holds. Callers only enqueue requests
//! ([`load_file`](FileLoader::load_file), [`unload_file`](FileLoader::unload_file));
//! every scheduling decision happens inside [`update`](FileLoader::update):
//!
//! 1. reap workers whose background task has finished, and a finished unload batch;
//! 2. drain the request queue;
//! 3. apply loads: `ref_count += 1`, a 0→1 crossing schedules the file;
//! 4. apply unloads: `ref_count -= 1`, a 1→0 crossing cancels a not yet
//!    dispatched load, defers the release of a file a worker is still reading,
//!    or queues a loaded file for the unload batch;
//! 5. launch the unload batch;
//! 6. grow the worker pool up to `max_job_count`;
//! 7. bind idle workers to scheduled files and start them;
//! 8. carry whatever could not be dispatched to the next tick, ahead of newly
//!    scheduled files.
//!
//! Nothing in `update` blocks except joining a worker that has already
//! reported `WaitForCallingComplete`.
//!
//! # Example
//!
//! ```no_run
//! use ironline::{FileLoader, LoaderConfig, ReadStatus};
//! use ironline::parsers::LineCollector;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut loader = FileLoader::builder()
//!     .config(LoaderConfig { max_job_count: 4, ..LoaderConfig::default() })
//!     .parser_factory(|_: &std::path::Path| LineCollector::boxed())
//!     .build()?;
//!
//! let ids = loader.add_glob("logs/*.log")?;
//! for &id in &ids {
//!     loader.load_file(id)?;
//! }
//!
//! // Somewhere in the caller's frame loop:
//! loader.update()?;
//!
//! for &id in &ids {
//!     if loader.state(id)?.status == ReadStatus::Completed {
//!         let lines = loader.parser_as::<LineCollector>(id)?;
//!         println!("{} lines", lines.lines().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::{LoaderConfig, check_max_job_count, clamp_block_size};
use crate::encoding::EncodingRef;
use crate::error::{LoaderError, Result};
use crate::glob::expand_glob;
use crate::metrics::LoaderMetrics;
use crate::parser::{BoxedParser, ParserCallback, ParserFactory};
use crate::parsers::LineCollector;
use crate::pool::WorkerPool;
use crate::source::{ByteSource, FsByteSource};
use crate::state::{ReadState, ReadStatus, SharedReadState};
use crate::unload::{BatchPoll, UnloadBatch};
use crate::worker::{Job, JobSpec, Worker, WorkerEnv, WorkerId};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What a [`LoadRequest`] asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadAction {
    /// Take a load hold on the file.
    Store,
    /// Release a load hold.
    UnLoad,
}

/// One queued load or unload, consumed by the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadRequest {
    pub index: usize,
    pub action: LoadAction,
}

#[derive(Default)]
struct QueueInner {
    requests: Vec<LoadRequest>,
    /// Ref count per file once every queued request is applied.
    projected: Vec<usize>,
}

/// Request queue shared with [`RequestHandle`]s.
#[derive(Default)]
struct RequestQueue {
    inner: Mutex<QueueInner>,
}

impl RequestQueue {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self) {
        self.lock().projected.push(0);
    }

    /// Update the projected count and enqueue under one lock, so a drained
    /// batch never holds an UnLoad without the Store it was checked against.
    fn push(&self, request: LoadRequest) -> Result<()> {
        let LoadRequest { index, action } = request;
        let mut inner = self.lock();
        let len = inner.projected.len();
        let held = inner
            .projected
            .get_mut(index)
            .ok_or(LoaderError::IndexOutOfRange { index, len })?;
        match action {
            LoadAction::Store => *held += 1,
            LoadAction::UnLoad => {
                *held = held
                    .checked_sub(1)
                    .ok_or(LoaderError::UnbalancedUnload(index))?;
            }
        }
        inner.requests.push(request);
        Ok(())
    }

    /// Count a hold applied directly to the file, outside the queue.
    fn hold(&self, index: usize) -> Result<()> {
        let mut inner = self.lock();
        let len = inner.projected.len();
        *inner
            .projected
            .get_mut(index)
            .ok_or(LoaderError::IndexOutOfRange { index, len })? += 1;
        Ok(())
    }

    fn drain(&self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.lock().requests)
    }

    fn is_empty(&self) -> bool {
        self.lock().requests.is_empty()
    }

    fn clear(&self) {
        let mut inner = self.lock();
        inner.requests.clear();
        inner.projected.clear();
    }
}

/// Cloneable, thread-safe handle for enqueueing requests to a [`FileLoader`].
#[derive(Clone)]
pub struct RequestHandle {
    queue: Arc<RequestQueue>,
}

impl RequestHandle {
    /// Enqueue a load hold for `index`.
    ///
    /// # Errors
    ///
    /// [`LoaderError::IndexOutOfRange`] for unknown files.
    pub fn load_file(&self, index: usize) -> Result<()> {
        self.queue.push(LoadRequest {
            index,
            action: LoadAction::Store,
        })
    }

    /// Enqueue the release of a load hold for `index`.
    ///
    /// # Errors
    ///
    /// [`LoaderError::UnbalancedUnload`] if no load hold is outstanding,
    /// counting requests still in the queue.
    pub fn unload_file(&self, index: usize) -> Result<()> {
        self.queue.push(LoadRequest {
            index,
            action: LoadAction::UnLoad,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Binding {
    Standby,
    Worker(WorkerId),
    Unloading,
}

struct FileSlot {
    path: PathBuf,
    encoding: Option<EncodingRef>,
    parser: Option<BoxedParser>,
    state: Arc<SharedReadState>,
    ref_count: usize,
    binding: Binding,
}

/// Builder for [`FileLoader`].
#[derive(Default)]
pub struct FileLoaderBuilder {
    config: LoaderConfig,
    source: Option<Arc<dyn ByteSource>>,
    factory: Option<Arc<dyn ParserFactory>>,
    threads: Option<Arc<rayon::ThreadPool>>,
}

impl FileLoaderBuilder {
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the filesystem reader.
    #[must_use]
    pub fn byte_source(mut self, source: impl ByteSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn shared_byte_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Parser created for every file added with [`FileLoader::add_file`].
    /// Defaults to [`LineCollector`].
    #[must_use]
    pub fn parser_factory(mut self, factory: impl ParserFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Run activations on an existing pool instead of a dedicated one.
    #[must_use]
    pub fn thread_pool(mut self, threads: Arc<rayon::ThreadPool>) -> Self {
        self.threads = Some(threads);
        self
    }

    /// # Errors
    ///
    /// Returns [`LoaderError::Config`]/[`LoaderError::UnknownEncoding`] for an
    /// invalid config and [`LoaderError::ThreadPool`] if the pool cannot start.
    pub fn build(self) -> Result<FileLoader> {
        let config = self.config;
        config.validate()?;
        let encoding = config.resolve_encoding()?;

        // Only a pool sized from `max_job_count` follows later cap changes.
        let resizable = self.threads.is_none() && config.worker_threads.is_none();
        let threads = match (self.threads, config.worker_threads) {
            (Some(threads), _) => threads,
            (None, Some(count)) => dedicated_pool(count)?,
            (None, None) => dedicated_pool(threads_for(config.max_job_count))?,
        };
        let source: Arc<dyn ByteSource> = match self.source {
            Some(source) => source,
            None => Arc::new(FsByteSource::with_decompression(config.decompress)),
        };
        let factory: Arc<dyn ParserFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(|_: &Path| LineCollector::boxed()),
        };

        let metrics = LoaderMetrics::new();
        info!(
            max_job_count = config.max_job_count,
            threads = threads.current_num_threads(),
            block_size = config.effective_block_size(),
            encoding = encoding.name(),
            "file loader ready"
        );

        Ok(FileLoader {
            slots: Vec::new(),
            queue: Arc::new(RequestQueue::default()),
            carried: VecDeque::new(),
            deferred_releases: Vec::new(),
            active: Vec::new(),
            pool: WorkerPool::new(metrics.clone()),
            unload: UnloadBatch::default(),
            env: WorkerEnv {
                source,
                metrics,
                threads,
            },
            factory,
            resizable,
            max_job_count: config.max_job_count,
            block_size: config.effective_block_size(),
            encoding,
        })
    }
}

/// Non-blocking, reference-counted loader for many text files.
pub struct FileLoader {
    slots: Vec<FileSlot>,
    queue: Arc<RequestQueue>,
    /// Scheduled files not dispatched yet, oldest first.
    carried: VecDeque<usize>,
    /// Files whose last hold was released while a worker was still bound.
    deferred_releases: Vec<usize>,
    active: Vec<Worker>,
    pool: WorkerPool,
    unload: UnloadBatch,
    env: WorkerEnv,
    factory: Arc<dyn ParserFactory>,
    /// The thread pool is ours and grows with `max_job_count`.
    resizable: bool,
    max_job_count: usize,
    block_size: usize,
    encoding: EncodingRef,
}

impl FileLoader {
    #[must_use]
    pub fn builder() -> FileLoaderBuilder {
        FileLoaderBuilder::default()
    }

    /// Loader reading from the filesystem with parsers from `factory`.
    ///
    /// # Errors
    ///
    /// See [`FileLoaderBuilder::build`].
    pub fn new(config: LoaderConfig, factory: impl ParserFactory + 'static) -> Result<Self> {
        Self::builder().config(config).parser_factory(factory).build()
    }

    // ======================================================================
    // Registration
    // ======================================================================

    /// Register a file with a parser from the loader's factory.
    ///
    /// # Errors
    ///
    /// [`LoaderError::InvalidPath`] for an empty path.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        check_path(path)?;
        let parser = self.factory.create(path);
        self.register(path.to_path_buf(), parser)
    }

    /// Register a file with an explicitly constructed parser.
    ///
    /// # Errors
    ///
    /// [`LoaderError::InvalidPath`] for an empty path.
    pub fn add_file_with_parser(
        &mut self,
        path: impl AsRef<Path>,
        parser: BoxedParser,
    ) -> Result<usize> {
        let path = path.as_ref();
        check_path(path)?;
        self.register(path.to_path_buf(), parser)
    }

    /// Register several files; returns their indices in order.
    ///
    /// # Errors
    ///
    /// Stops at the first invalid path; files before it stay registered.
    pub fn add_files<I, P>(&mut self, paths: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(|p| self.add_file(p)).collect()
    }

    /// Register every file matching a glob pattern, in sorted order.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Glob`] for invalid patterns or unreadable directories.
    pub fn add_glob(&mut self, pattern: &str) -> Result<Vec<usize>> {
        let files = expand_glob(pattern)?;
        debug!(pattern, matched = files.len(), "expanded glob");
        self.add_files(files)
    }

    fn register(&mut self, path: PathBuf, mut parser: BoxedParser) -> Result<usize> {
        parser.init();
        let index = self.slots.len();
        self.slots.push(FileSlot {
            path,
            encoding: None,
            parser: Some(parser),
            state: Arc::new(SharedReadState::new()),
            ref_count: 0,
            binding: Binding::Standby,
        });
        self.queue.register();
        Ok(index)
    }

    /// Override (or with `None`, reset) the encoding of one file. Takes effect
    /// at its next activation.
    ///
    /// # Errors
    ///
    /// [`LoaderError::IndexOutOfRange`] for unknown files.
    pub fn set_file_encoding(&mut self, index: usize, encoding: Option<EncodingRef>) -> Result<()> {
        self.slot_mut(index)?.encoding = encoding;
        Ok(())
    }

    /// Path a file was registered with.
    ///
    /// # Errors
    ///
    /// [`LoaderError::IndexOutOfRange`] for unknown files.
    pub fn path(&self, index: usize) -> Result<&Path> {
        Ok(&self.slot(index)?.path)
    }

    // ======================================================================
    // Requests
    // ======================================================================

    /// Enqueue a load hold; the file is read once its hold count leaves zero.
    ///
    /// # Errors
    ///
    /// [`LoaderError::IndexOutOfRange`] for unknown files.
    pub fn load_file(&self, index: usize) -> Result<()> {
        self.handle().load_file(index)
    }

    /// Enqueue the release of a load hold; the file is unloaded once its hold
    /// count returns to zero.
    ///
    /// # Errors
    ///
    /// [`LoaderError::UnbalancedUnload`] if no hold is outstanding, counting
    /// queued requests.
    pub fn unload_file(&self, index: usize) -> Result<()> {
        self.handle().unload_file(index)
    }

    /// Handle for enqueueing requests from other threads.
    #[must_use]
    pub fn handle(&self) -> RequestHandle {
        RequestHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Point-in-time snapshot of a file's state.
    ///
    /// # Errors
    ///
    /// [`LoaderError::IndexOutOfRange`] for unknown files.
    pub fn state(&self, index: usize) -> Result<ReadState> {
        let slot = self.slot(index)?;
        Ok(slot.state.snapshot(slot.ref_count))
    }

    // ======================================================================
    // Ticks
    // ======================================================================

    /// Run one scheduling tick honoring `max_job_count`.
    ///
    /// # Errors
    ///
    /// Only internal invariant violations.
    pub fn update(&mut self) -> Result<()> {
        self.tick(false)
    }

    /// Run one tick that dispatches every schedulable file regardless of
    /// `max_job_count`.
    ///
    /// # Errors
    ///
    /// Only internal invariant violations.
    pub fn run_all_jobs(&mut self) -> Result<()> {
        self.tick(true)
    }

    fn tick(&mut self, flush: bool) -> Result<()> {
        self.reap()?;

        let batch = self.queue.drain();
        let mut to_load: Vec<usize> = self.carried.drain(..).collect();

        for request in batch.iter().filter(|r| r.action == LoadAction::Store) {
            let slot = &mut self.slots[request.index];
            slot.ref_count += 1;
            if slot.ref_count == 1 && !to_load.contains(&request.index) {
                to_load.push(request.index);
            }
        }

        for request in batch.iter().filter(|r| r.action == LoadAction::UnLoad) {
            let slot = &mut self.slots[request.index];
            let Some(count) = slot.ref_count.checked_sub(1) else {
                // The queue rejects these on push; skipping keeps the rest of the batch.
                error!(index = request.index, "unload without a hold reached the scheduler");
                continue;
            };
            slot.ref_count = count;
            if count == 0 {
                self.release(request.index, &mut to_load);
            }
        }

        for index in std::mem::take(&mut self.deferred_releases) {
            if self.slots[index].ref_count == 0 {
                self.release(index, &mut to_load);
            }
        }

        self.unload.launch(&self.env.threads, &self.env.metrics);

        self.dispatch_all(to_load, flush)
    }

    /// A file's hold count reached zero.
    fn release(&mut self, index: usize, to_load: &mut Vec<usize>) {
        let slot = &mut self.slots[index];
        if let Some(pos) = to_load.iter().position(|&i| i == index) {
            to_load.remove(pos);
            if slot.binding == Binding::Standby && slot.state.status() == ReadStatus::UnLoaded {
                debug!(index, "load cancelled before dispatch");
                self.env.metrics.load_cancelled();
            }
        }

        match slot.binding {
            Binding::Worker(worker) => {
                debug!(index, worker, "deferring unload until the activation is reaped");
                self.deferred_releases.push(index);
            }
            Binding::Unloading => {}
            Binding::Standby => {
                if slot.state.status() == ReadStatus::Completed
                    && let Some(parser) = slot.parser.take()
                {
                    slot.binding = Binding::Unloading;
                    self.unload.push(index, parser);
                }
            }
        }
    }

    fn dispatch_all(&mut self, to_load: Vec<usize>, flush: bool) -> Result<()> {
        let mut ready = Vec::new();
        let mut satisfied = HashSet::new();
        for &index in &to_load {
            let slot = &self.slots[index];
            match slot.binding {
                Binding::Standby if slot.state.status() == ReadStatus::Completed => {
                    // Still loaded from an activation whose release was dropped.
                    satisfied.insert(index);
                }
                Binding::Standby => ready.push(index),
                Binding::Worker(_) | Binding::Unloading => {}
            }
        }

        let mut dispatched = HashSet::new();
        let outcome = self.dispatch_ready(&ready, flush, &mut dispatched);

        // Undispatched files keep their place even when dispatch fails.
        self.carried.extend(
            to_load
                .into_iter()
                .filter(|i| !dispatched.contains(i) && !satisfied.contains(i)),
        );
        if !self.carried.is_empty() {
            debug!(carried = self.carried.len(), active = self.active.len(), "files waiting for a worker");
        }
        outcome
    }

    fn dispatch_ready(&mut self, ready: &[usize], flush: bool, dispatched: &mut HashSet<usize>) -> Result<()> {
        let mut need = ready.len().saturating_sub(self.pool.idle_len());
        if !flush {
            need = need.min(self.max_job_count.saturating_sub(self.pool.live()));
        }
        need = need.min(self.pool.headroom());
        self.pool.grow(need, &self.encoding)?;

        let mut n = self.pool.idle_len().min(ready.len());
        if !flush {
            n = n.min(self.max_job_count.saturating_sub(self.active.len()));
        }
        for &index in &ready[..n] {
            self.dispatch(index)?;
            dispatched.insert(index);
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize) -> Result<()> {
        let Some(mut worker) = self.pool.take_idle() else {
            return Ok(());
        };
        let slot = &mut self.slots[index];
        let Some(parser) = slot.parser.take() else {
            self.pool.give_back(worker, self.max_job_count)?;
            return Err(LoaderError::JobActive(index));
        };
        let spec = JobSpec {
            index,
            path: slot.path.clone(),
            encoding: slot
                .encoding
                .clone()
                .unwrap_or_else(|| EncodingRef::clone(&self.encoding)),
            block_size: self.block_size,
            state: Arc::clone(&slot.state),
        };
        slot.binding = Binding::Worker(worker.id());
        worker.start(Job { spec, parser }, &self.env)?;
        self.active.push(worker);
        Ok(())
    }

    fn reap(&mut self) -> Result<()> {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].is_ready() {
                let worker = self.active.swap_remove(i);
                self.finish_worker(worker)?;
            } else {
                i += 1;
            }
        }

        match self.unload.poll() {
            BatchPoll::Finished(targets) => self.finish_unload(targets),
            BatchPoll::Lost(indices) => self.lose_unload(indices),
            BatchPoll::Idle | BatchPoll::Running => {}
        }
        Ok(())
    }

    fn finish_worker(&mut self, mut worker: Worker) -> Result<()> {
        let bound = worker.bound_index();
        match worker.complete(&self.env.metrics) {
            Ok((index, parser)) => {
                let slot = &mut self.slots[index];
                slot.parser = Some(parser);
                slot.binding = Binding::Standby;
                debug!(index, worker = worker.id(), "activation reaped");
                self.pool.give_back(worker, self.max_job_count)
            }
            Err(err) => {
                error!(worker = worker.id(), error = %err, "worker lost its activation");
                if let Some(index) = bound {
                    self.reset_slot(index, err.to_string());
                }
                self.pool.dispose(worker)
            }
        }
    }

    fn finish_unload(&mut self, targets: Vec<(usize, BoxedParser)>) {
        debug!(files = targets.len(), "unload batch reaped");
        for (index, parser) in targets {
            let slot = &mut self.slots[index];
            slot.parser = Some(parser);
            slot.binding = Binding::Standby;
            slot.state.set_status(ReadStatus::UnLoaded);
        }
    }

    fn lose_unload(&mut self, indices: Vec<usize>) {
        error!(files = indices.len(), "unload batch vanished; recreating parsers");
        for index in indices {
            self.reset_slot(index, "unload batch lost".to_string());
        }
    }

    /// Give a slot whose parser was lost a fresh one, back in `UnLoaded`.
    fn reset_slot(&mut self, index: usize, failure: String) {
        let slot = &mut self.slots[index];
        let mut parser = self.factory.create(&slot.path);
        parser.init();
        slot.parser = Some(parser);
        slot.binding = Binding::Standby;
        slot.state.record_failure(failure);
        slot.state.set_status(ReadStatus::UnLoaded);
    }

    // ======================================================================
    // Synchronous paths
    // ======================================================================

    /// Take a load hold and, if the file is not loaded, read it right now on
    /// the calling thread.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobActive`] if a background job or unload is bound to
    /// the file.
    pub fn load_file_sync(&mut self, index: usize) -> Result<()> {
        let slot = self.slot(index)?;
        if slot.binding != Binding::Standby {
            return Err(LoaderError::JobActive(index));
        }
        self.queue.hold(index)?;
        self.slots[index].ref_count += 1;
        if self.slots[index].state.status() == ReadStatus::Completed {
            return Ok(());
        }

        if self.pool.idle_len() == 0 {
            self.pool.grow(1_usize.min(self.pool.headroom()), &self.encoding)?;
        }
        let Some(mut worker) = self.pool.take_idle() else {
            return Err(LoaderError::WorkerIdsExhausted(self.pool.live()));
        };

        let slot = &mut self.slots[index];
        let Some(parser) = slot.parser.take() else {
            self.pool.give_back(worker, self.max_job_count)?;
            return Err(LoaderError::JobActive(index));
        };
        let spec = JobSpec {
            index,
            path: slot.path.clone(),
            encoding: slot
                .encoding
                .clone()
                .unwrap_or_else(|| EncodingRef::clone(&self.encoding)),
            block_size: self.block_size,
            state: Arc::clone(&slot.state),
        };
        let parser = worker.run_synchronous(Job { spec, parser }, &self.env)?;
        self.slots[index].parser = Some(parser);
        self.carried.retain(|&i| i != index);
        self.pool.give_back(worker, self.max_job_count)
    }

    /// Tick until every request has been applied, every activation reaped and
    /// every unload batch finished. Blocks the calling thread.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`update`](Self::update).
    pub fn drain(&mut self) -> Result<()> {
        loop {
            self.update()?;
            if self.is_idle() {
                return Ok(());
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }

    /// No queued, carried, running or unloading work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
            && self.carried.is_empty()
            && self.deferred_releases.is_empty()
            && !self.unload.has_work()
            && self.queue.is_empty()
    }

    /// Number of activations currently bound to a worker.
    #[must_use]
    pub fn active_jobs(&self) -> usize {
        self.active.len()
    }

    /// Workers alive in the pool, bound or idle.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.live()
    }

    /// Threads in the pool activations and unload batches run on.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.env.threads.current_num_threads()
    }

    // ======================================================================
    // Properties
    // ======================================================================

    /// Number of registered files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn max_job_count(&self) -> usize {
        self.max_job_count
    }

    /// Change the concurrency cap. Idle workers beyond the new cap are
    /// disposed; running activations are never interrupted. A dedicated
    /// thread pool is rebuilt larger when the cap outgrows it, unless
    /// `worker_threads` or [`FileLoaderBuilder::thread_pool`] fixed its size.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Config`] for zero or a value beyond the worker id space.
    pub fn set_max_job_count(&mut self, count: usize) -> Result<()> {
        check_max_job_count(count)?;
        let threads = threads_for(count);
        if self.resizable && threads > self.env.threads.current_num_threads() {
            // Tasks already spawned keep the old pool alive until they finish.
            self.env.threads = dedicated_pool(threads)?;
            info!(threads, max_job_count = count, "worker threads resized");
        }
        self.max_job_count = count;
        self.pool.shrink_to(count)
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Set the block size for future activations, clamped to
    /// [`MIN_BLOCK_SIZE`](crate::config::MIN_BLOCK_SIZE).
    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = clamp_block_size(size);
    }

    #[must_use]
    pub fn encoding(&self) -> &EncodingRef {
        &self.encoding
    }

    /// Default encoding for files without an override.
    pub fn set_encoding(&mut self, encoding: EncodingRef) {
        self.encoding = encoding;
    }

    #[must_use]
    pub fn metrics(&self) -> &LoaderMetrics {
        &self.env.metrics
    }

    // ======================================================================
    // Parsed data
    // ======================================================================

    /// The parser (and with it the parsed data) of a file.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobActive`] while an activation or unload owns it.
    pub fn parser(&self, index: usize) -> Result<&dyn ParserCallback> {
        let slot = self.slot(index)?;
        match (&slot.parser, slot.binding) {
            (Some(parser), Binding::Standby) => Ok(parser.as_ref()),
            _ => Err(LoaderError::JobActive(index)),
        }
    }

    /// Mutable access to a file's parser.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobActive`] while an activation or unload owns it.
    pub fn parser_mut(&mut self, index: usize) -> Result<&mut dyn ParserCallback> {
        let slot = self.slot_mut(index)?;
        match (&mut slot.parser, slot.binding) {
            (Some(parser), Binding::Standby) => Ok(parser.as_mut()),
            _ => Err(LoaderError::JobActive(index)),
        }
    }

    /// A file's parser downcast to its concrete type.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobActive`] while busy, [`LoaderError::ParserType`] if
    /// the parser is not a `P`.
    pub fn parser_as<P: ParserCallback>(&self, index: usize) -> Result<&P> {
        self.parser(index)?
            .as_any()
            .downcast_ref::<P>()
            .ok_or(LoaderError::ParserType {
                index,
                expected: std::any::type_name::<P>(),
            })
    }

    /// Mutable variant of [`parser_as`](Self::parser_as).
    ///
    /// # Errors
    ///
    /// As [`parser_as`](Self::parser_as).
    pub fn parser_as_mut<P: ParserCallback>(&mut self, index: usize) -> Result<&mut P> {
        self.parser_mut(index)?
            .as_any_mut()
            .downcast_mut::<P>()
            .ok_or(LoaderError::ParserType {
                index,
                expected: std::any::type_name::<P>(),
            })
    }

    // ======================================================================
    // Teardown
    // ======================================================================

    /// Forget every registered file and drop their parsers.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobsRunning`] while activations or an unload batch run.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_quiet()?;
        self.slots.clear();
        self.queue.clear();
        self.carried.clear();
        self.deferred_releases.clear();
        Ok(())
    }

    /// Shut the loader down.
    ///
    /// # Errors
    ///
    /// [`LoaderError::JobsRunning`] if work is still in flight; call
    /// [`drain`](Self::drain) first.
    pub fn close(mut self) -> Result<()> {
        self.ensure_quiet()?;
        self.clear()?;
        self.pool.shrink_to(0)
    }

    fn ensure_quiet(&self) -> Result<()> {
        let running = self.active.len() + usize::from(self.unload.is_running());
        if running > 0 {
            return Err(LoaderError::JobsRunning(running));
        }
        Ok(())
    }

    fn slot(&self, index: usize) -> Result<&FileSlot> {
        let len = self.slots.len();
        self.slots
            .get(index)
            .ok_or(LoaderError::IndexOutOfRange { index, len })
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut FileSlot> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(LoaderError::IndexOutOfRange { index, len })
    }
}

impl Drop for FileLoader {
    fn drop(&mut self) {
        if self.active.is_empty() && !self.unload.is_running() {
            return;
        }
        warn!(
            active = self.active.len(),
            "file loader dropped with jobs in flight; joining them"
        );
        for mut worker in self.active.drain(..) {
            if let Err(err) = worker.complete(&self.env.metrics) {
                error!(error = %err, "failed to join worker during teardown");
            }
        }
        if let BatchPoll::Lost(indices) = self.unload.wait() {
            error!(files = indices.len(), "unload batch vanished during teardown");
        }
    }
}

/// One thread per activation plus one for the unload batch.
fn threads_for(max_job_count: usize) -> usize {
    max_job_count + 1
}

fn dedicated_pool(threads: usize) -> Result<Arc<rayon::ThreadPool>> {
    Ok(Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ironline-worker-{i}"))
            .build()?,
    ))
}

fn check_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(LoaderError::InvalidPath(path.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn request(action: LoadAction) -> LoadRequest {
        LoadRequest { index: 0, action }
    }

    #[test]
    fn drained_batches_never_release_more_than_they_hold() {
        const ROUNDS: usize = 5_000;
        let queue = Arc::new(RequestQueue::default());
        queue.register();

        let loads = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    queue.push(request(LoadAction::Store)).unwrap();
                }
            })
        };
        let unloads = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut released = 0;
                while released < ROUNDS {
                    match queue.push(request(LoadAction::UnLoad)) {
                        Ok(()) => released += 1,
                        Err(LoaderError::UnbalancedUnload(0)) => thread::yield_now(),
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            })
        };

        // Same order as a tick: loads of a batch first, then its unloads.
        let mut held = 0usize;
        let mut apply = |batch: Vec<LoadRequest>| {
            let stores = batch.iter().filter(|r| r.action == LoadAction::Store).count();
            held += stores;
            held = held
                .checked_sub(batch.len() - stores)
                .expect("batch released a hold it did not carry");
        };
        while !loads.is_finished() || !unloads.is_finished() {
            apply(queue.drain());
        }
        loads.join().unwrap();
        unloads.join().unwrap();
        apply(queue.drain());

        assert_eq!(held, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn rejected_requests_are_not_queued() {
        let queue = RequestQueue::default();
        queue.register();
        assert!(matches!(
            queue.push(request(LoadAction::UnLoad)),
            Err(LoaderError::UnbalancedUnload(0))
        ));
        assert!(matches!(
            queue.push(LoadRequest { index: 3, action: LoadAction::Store }),
            Err(LoaderError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(queue.is_empty());
    }
}

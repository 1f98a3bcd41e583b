//! Per-file pipeline: read → decode → parse → post-process.
//!
//! A [`Worker`] owns a [`StreamingDecoder`] and a byte buffer that are reused
//! across activations. [`Worker::start`] moves both, together with the file's
//! parser, into a task on the loader's `rayon` pool; the task hands them back
//! over a one-shot channel that [`Worker::complete`] joins on.
//!
//! Status transitions of one activation:
//!
//! ```text
//! UnLoaded/Completed ─start─▶ ReadAsync ─bytes─▶ ParseText ─post_read_proc─▶
//!     WaitForCallingComplete ─complete─▶ Completed
//! ```

use crate::config::MIN_BLOCK_SIZE;
use crate::decoder::StreamingDecoder;
use crate::encoding::EncodingRef;
use crate::error::{LoaderError, Result};
use crate::metrics::LoaderMetrics;
use crate::parser::{BoxedParser, ParserCallback};
use crate::source::ByteSource;
use crate::state::{PhaseTimer, ReadStatus, SharedReadState};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, error, warn};

/// Identifier of a pooled worker.
pub type WorkerId = u32;

/// What a worker needs to know about one activation.
pub(crate) struct JobSpec {
    pub index: usize,
    pub path: PathBuf,
    pub encoding: EncodingRef,
    pub block_size: usize,
    pub state: Arc<SharedReadState>,
}

/// One activation: the file description plus its parser, moved in by value.
pub(crate) struct Job {
    pub spec: JobSpec,
    pub parser: BoxedParser,
}

/// Shared collaborators handed to every activation.
#[derive(Clone)]
pub(crate) struct WorkerEnv {
    pub source: Arc<dyn ByteSource>,
    pub metrics: LoaderMetrics,
    pub threads: Arc<rayon::ThreadPool>,
}

/// Resources a worker reuses across activations.
struct Kit {
    decoder: StreamingDecoder,
    bytes: Vec<u8>,
}

struct Finished {
    kit: Kit,
    parser: BoxedParser,
}

struct Activation {
    index: usize,
    state: Arc<SharedReadState>,
    done: Receiver<Finished>,
}

pub(crate) struct Worker {
    id: WorkerId,
    kit: Option<Kit>,
    activation: Option<Activation>,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, encoding: EncodingRef) -> Self {
        Self {
            id,
            kit: Some(Kit {
                decoder: StreamingDecoder::new(encoding),
                bytes: Vec::new(),
            }),
            activation: None,
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// File index of the running or unjoined activation.
    pub(crate) fn bound_index(&self) -> Option<usize> {
        self.activation.as_ref().map(|a| a.index)
    }

    /// The background task has finished; [`complete`](Self::complete) will not wait.
    pub(crate) fn is_ready(&self) -> bool {
        self.activation
            .as_ref()
            .is_some_and(|a| a.state.status() == ReadStatus::WaitForCallingComplete)
    }

    /// Begin an activation on the background pool.
    ///
    /// # Errors
    ///
    /// [`LoaderError::WorkerNotJoined`] if the previous activation has not
    /// been joined with [`complete`](Self::complete).
    pub(crate) fn start(&mut self, job: Job, env: &WorkerEnv) -> Result<()> {
        if self.activation.is_some() {
            return Err(LoaderError::WorkerNotJoined(self.id));
        }
        let Some(mut kit) = self.kit.take() else {
            return Err(LoaderError::WorkerNotJoined(self.id));
        };

        let Job { spec, mut parser } = job;
        debug!(worker = self.id, index = spec.index, path = %spec.path.display(), "starting activation");
        spec.state.begin_activation();
        env.metrics.activation_started();

        let (tx, rx) = mpsc::sync_channel(1);
        let index = spec.index;
        let state = Arc::clone(&spec.state);
        let source = Arc::clone(&env.source);
        let metrics = env.metrics.clone();
        env.threads.spawn(move || {
            execute(&mut kit, &mut parser, &spec, source.as_ref(), &metrics);
            spec.state.set_status(ReadStatus::WaitForCallingComplete);
            // The loader may have been dropped meanwhile; nothing to hand back to.
            let _ = tx.send(Finished { kit, parser });
        });

        self.activation = Some(Activation {
            index,
            state,
            done: rx,
        });
        Ok(())
    }

    /// Join the current activation and mark its file `Completed`.
    ///
    /// Blocks until the background task has handed back its resources, which
    /// is immediate once [`is_ready`](Self::is_ready) returned `true`.
    ///
    /// # Errors
    ///
    /// [`LoaderError::WorkerLost`] if there is no activation or its task
    /// vanished without reporting back.
    pub(crate) fn complete(&mut self, metrics: &LoaderMetrics) -> Result<(usize, BoxedParser)> {
        let activation = self.activation.take().ok_or(LoaderError::WorkerLost(self.id))?;
        let finished = activation
            .done
            .recv()
            .map_err(|_| LoaderError::WorkerLost(self.id))?;
        self.kit = Some(finished.kit);
        activation.state.set_status(ReadStatus::Completed);
        metrics.activation_completed();
        Ok((activation.index, finished.parser))
    }

    /// Run a whole activation on the calling thread and join it immediately.
    ///
    /// # Errors
    ///
    /// [`LoaderError::WorkerNotJoined`] if an activation is still pending.
    pub(crate) fn run_synchronous(&mut self, job: Job, env: &WorkerEnv) -> Result<BoxedParser> {
        if self.activation.is_some() {
            return Err(LoaderError::WorkerNotJoined(self.id));
        }
        let kit = self.kit.as_mut().ok_or(LoaderError::WorkerNotJoined(self.id))?;

        let Job { spec, mut parser } = job;
        debug!(worker = self.id, index = spec.index, path = %spec.path.display(), "running activation synchronously");
        spec.state.begin_activation();
        env.metrics.activation_started();
        execute(kit, &mut parser, &spec, env.source.as_ref(), &env.metrics);
        spec.state.set_status(ReadStatus::Completed);
        env.metrics.activation_completed();
        Ok(parser)
    }
}

/// Run the pipeline, containing parser panics to this activation.
fn execute(
    kit: &mut Kit,
    parser: &mut BoxedParser,
    spec: &JobSpec,
    source: &dyn ByteSource,
    metrics: &LoaderMetrics,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_pipeline(kit, parser.as_mut(), spec, source, metrics);
    }));
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        error!(index = spec.index, path = %spec.path.display(), %message, "activation panicked");
        metrics.worker_panicked();
        spec.state.record_failure(format!("panic: {message}"));
    }
}

fn run_pipeline(
    kit: &mut Kit,
    parser: &mut dyn ParserCallback,
    spec: &JobSpec,
    source: &dyn ByteSource,
    metrics: &LoaderMetrics,
) {
    let mut timer = PhaseTimer::start();

    kit.decoder.reset(&spec.encoding);
    kit.bytes.clear();
    parser.clear();

    let read = source.read_to_end(&spec.path, &mut kit.bytes);
    spec.state.record_read(timer.lap());
    spec.state.set_status(ReadStatus::ParseText);

    match read {
        Ok(()) => {
            metrics.add_bytes(kit.bytes.len());
            match feed_blocks(kit, parser, spec) {
                Ok(fed) => {
                    metrics.add_lines(fed.lines);
                    if fed.aborted {
                        debug!(index = spec.index, lines = fed.lines, "parser stopped early");
                        metrics.parse_aborted();
                    }
                }
                Err(err) => {
                    error!(index = spec.index, error = %err, "line decoding failed");
                    spec.state.record_failure(err.to_string());
                }
            }
        }
        Err(err) => {
            warn!(index = spec.index, path = %spec.path.display(), error = %format!("{err:#}"), "read failed");
            metrics.read_failed();
            spec.state.record_failure(format!("{err:#}"));
        }
    }
    spec.state.record_parse(timer.lap());

    parser.post_read_proc();
    spec.state.record_post_proc(timer.lap());
}

#[derive(Default)]
struct Fed {
    lines: u64,
    aborted: bool,
}

/// Decode the buffered bytes block by block, feeding lines until the parser
/// asks to stop.
fn feed_blocks(kit: &mut Kit, parser: &mut dyn ParserCallback, spec: &JobSpec) -> Result<Fed> {
    let block_size = spec.block_size.max(MIN_BLOCK_SIZE);
    let Kit { decoder, bytes } = kit;
    spec.state.set_block_count(bytes.len().div_ceil(block_size));

    let mut fed = Fed::default();
    for block in bytes.chunks(block_size) {
        let decoded = decoder.decode_block(block);
        for line in decoded.iter() {
            fed.lines += 1;
            if !parser.parse_line(line?) {
                fed.aborted = true;
                spec.state.block_done();
                return Ok(fed);
            }
        }
        spec.state.block_done();
    }

    for line in decoder.finish().iter() {
        fed.lines += 1;
        if !parser.parse_line(line?) {
            fed.aborted = true;
        }
    }
    Ok(fed)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

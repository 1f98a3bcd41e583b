//! A parser that records the callbacks it receives.

use crate::parser::{BoxedParser, ParserCallback};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One callback as seen by a [`RecordingParser`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParserEvent {
    Init,
    Clear,
    Line(String),
    PostReadProc,
    Unload,
}

#[derive(Default)]
struct Behavior {
    stop_after: Option<usize>,
    panic_on: Option<String>,
}

/// Records every callback into a log shared with its clones.
///
/// The loader takes ownership of the boxed parser, so tests keep a clone and
/// inspect the log through it.
#[derive(Clone, Default)]
pub struct RecordingParser {
    events: Arc<Mutex<Vec<ParserEvent>>>,
    behavior: Arc<Behavior>,
    lines_this_activation: usize,
}

impl RecordingParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `false` from `parse_line` once `count` lines were accepted.
    #[must_use]
    pub fn stopping_after(count: usize) -> Self {
        Self {
            behavior: Arc::new(Behavior {
                stop_after: Some(count),
                panic_on: None,
            }),
            ..Self::default()
        }
    }

    /// Panic when a line equal to `line` arrives.
    #[must_use]
    pub fn panicking_on(line: &str) -> Self {
        Self {
            behavior: Arc::new(Behavior {
                stop_after: None,
                panic_on: Some(line.to_string()),
            }),
            ..Self::default()
        }
    }

    /// A boxed clone sharing this parser's log.
    #[must_use]
    pub fn boxed(&self) -> BoxedParser {
        Box::new(self.clone())
    }

    fn log(&self) -> MutexGuard<'_, Vec<ParserEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: ParserEvent) {
        self.log().push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<ParserEvent> {
        self.log().clone()
    }

    /// Lines received since the last `clear`.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let events = self.log();
        let start = events
            .iter()
            .rposition(|e| *e == ParserEvent::Clear)
            .map_or(0, |i| i + 1);
        events[start..]
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Line(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times `event` was recorded.
    #[must_use]
    pub fn count(&self, event: &ParserEvent) -> usize {
        self.log().iter().filter(|e| *e == event).count()
    }
}

impl ParserCallback for RecordingParser {
    fn init(&mut self) {
        self.record(ParserEvent::Init);
    }

    fn clear(&mut self) {
        self.lines_this_activation = 0;
        self.record(ParserEvent::Clear);
    }

    fn parse_line(&mut self, line: &str) -> bool {
        if self.behavior.panic_on.as_deref() == Some(line) {
            panic!("recording parser asked to panic on {line:?}");
        }
        self.record(ParserEvent::Line(line.to_string()));
        self.lines_this_activation += 1;
        self.behavior
            .stop_after
            .is_none_or(|limit| self.lines_this_activation < limit)
    }

    fn post_read_proc(&mut self) {
        self.record(ParserEvent::PostReadProc);
    }

    fn unload(&mut self) {
        self.record(ParserEvent::Unload);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//! The line-parser plug-in contract.
//!
//! Each registered file owns exactly one [`ParserCallback`]. The loader moves
//! it into the worker running that file's activation (or into the unload
//! batch) and back to the file's slot when that work is reaped, so a parser
//! is only ever touched by one thread at a time.
//!
//! Call sequence:
//! - [`init`](ParserCallback::init) once, when the file is registered;
//! - per activation: [`clear`](ParserCallback::clear), then
//!   [`parse_line`](ParserCallback::parse_line) for each decoded line until it
//!   returns `false` or input ends, then
//!   [`post_read_proc`](ParserCallback::post_read_proc);
//! - [`unload`](ParserCallback::unload) when the file's last load hold is released.
//!
//! # Example
//!
//! ```
//! use ironline::ParserCallback;
//! use std::any::Any;
//!
//! #[derive(Default)]
//! struct WordCount {
//!     words: usize,
//! }
//!
//! impl ParserCallback for WordCount {
//!     fn clear(&mut self) {
//!         self.words = 0;
//!     }
//!
//!     fn parse_line(&mut self, line: &str) -> bool {
//!         self.words += line.split_whitespace().count();
//!         true
//!     }
//!
//!     fn unload(&mut self) {
//!         self.words = 0;
//!     }
//!
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//! ```

use std::any::Any;
use std::path::Path;

/// Consumer of decoded lines for one file.
pub trait ParserCallback: Send + Any {
    /// Called once at registration; may allocate long-lived resources.
    fn init(&mut self) {}

    /// Reset parse state at the start of every activation.
    fn clear(&mut self);

    /// Consume one line (without terminator). Return `false` to stop reading
    /// the rest of the file, e.g. on malformed input.
    fn parse_line(&mut self, line: &str) -> bool;

    /// Finalize after the last line or after an early stop.
    fn post_read_proc(&mut self) {}

    /// Release parsed data when the file is unloaded.
    fn unload(&mut self);

    /// Cast to Any for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Cast to Any for mutable downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Owned, dynamically dispatched parser.
pub type BoxedParser = Box<dyn ParserCallback>;

/// Creates the parser for each file registered with a loader.
pub trait ParserFactory: Send + Sync {
    fn create(&self, path: &Path) -> BoxedParser;
}

impl<F> ParserFactory for F
where
    F: Fn(&Path) -> BoxedParser + Send + Sync,
{
    fn create(&self, path: &Path) -> BoxedParser {
        self(path)
    }
}

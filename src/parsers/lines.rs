//! Line-collecting parser.

use crate::parser::{BoxedParser, ParserCallback};
use std::any::Any;

/// Stores every decoded line of a file.
///
/// With [`with_limit`](Self::with_limit) it stops reading once the limit is
/// reached, which is handy for previews of large files.
#[derive(Clone, Debug, Default)]
pub struct LineCollector {
    lines: Vec<String>,
    limit: Option<usize>,
    truncated: bool,
}

impl LineCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that keeps at most `limit` lines and then stops the read.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// A fresh collector, boxed for [`FileLoader`](crate::FileLoader).
    #[must_use]
    pub fn boxed() -> BoxedParser {
        Box::new(Self::new())
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The last activation stopped at the line limit.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Lines joined with `\n`.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl ParserCallback for LineCollector {
    fn clear(&mut self) {
        self.lines.clear();
        self.truncated = false;
    }

    fn parse_line(&mut self, line: &str) -> bool {
        if let Some(limit) = self.limit
            && self.lines.len() >= limit
        {
            self.truncated = true;
            return false;
        }
        self.lines.push(line.to_owned());
        true
    }

    fn unload(&mut self) {
        self.lines = Vec::new();
        self.truncated = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

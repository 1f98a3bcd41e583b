//! JSON Lines parser.
//!
//! Each non-blank line is deserialized into `T` with `serde_json`. Malformed
//! lines are recorded as [`ParseFailure`]s; by default parsing continues, with
//! [`JsonlParser::strict`] the first failure stops the read.
//!
//! ```
//! use ironline::ParserCallback;
//! use ironline::parsers::JsonlParser;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Event {
//!     id: u32,
//! }
//!
//! let mut parser = JsonlParser::<Event>::new();
//! assert!(parser.parse_line(r#"{"id": 7}"#));
//! assert!(parser.parse_line("not json"));
//! assert_eq!(parser.records()[0].id, 7);
//! assert_eq!(parser.failures()[0].line, 2);
//! ```

use crate::parser::{BoxedParser, ParserCallback};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;

/// A line that failed to deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    /// 1-based line number within the file.
    pub line: usize,
    pub message: String,
}

/// Deserializes every line of a file into `T`.
#[derive(Debug)]
pub struct JsonlParser<T> {
    records: Vec<T>,
    failures: Vec<ParseFailure>,
    line_no: usize,
    strict: bool,
}

impl<T> Default for JsonlParser<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
            line_no: 0,
            strict: false,
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> JsonlParser<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser that stops reading at the first malformed line.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn boxed() -> BoxedParser {
        Box::new(Self::new())
    }

    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[must_use]
    pub fn failures(&self) -> &[ParseFailure] {
        &self.failures
    }
}

impl<T: DeserializeOwned + Send + 'static> ParserCallback for JsonlParser<T> {
    fn clear(&mut self) {
        self.records.clear();
        self.failures.clear();
        self.line_no = 0;
    }

    fn parse_line(&mut self, line: &str) -> bool {
        self.line_no += 1;
        if line.trim().is_empty() {
            return true;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => {
                self.records.push(record);
                true
            }
            Err(e) => {
                self.failures.push(ParseFailure {
                    line: self.line_no,
                    message: e.to_string(),
                });
                !self.strict
            }
        }
    }

    fn unload(&mut self) {
        self.records = Vec::new();
        self.failures = Vec::new();
        self.line_no = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//! Script failure type and source positions.

use std::fmt;

use thiserror::Error;

/// A 1-based line/column position in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A failure raised while lexing, parsing, or running a script.
///
/// `stack` always holds at least one frame, innermost first, in the form
/// `at <function> (<file>:<line>:<col>)`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    pub stack: Vec<String>,
}

impl ScriptError {
    /// Creates an error with a single frame located at `span` in `file`.
    pub fn at(message: impl Into<String>, function: &str, file: &str, span: Span) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Error".to_string();
        }
        Self {
            message,
            stack: vec![frame_line(function, file, span)],
        }
    }

    /// A syntax error at `span`, reported in the top-level frame.
    pub fn syntax(detail: impl fmt::Display, file: &str, span: Span) -> Self {
        Self::at(format!("SyntaxError: {detail}"), "<program>", file, span)
    }

    /// Appends a caller frame as the error unwinds through a call site.
    pub fn push_frame(&mut self, function: &str, file: &str, span: Span) {
        self.stack.push(frame_line(function, file, span));
    }
}

fn frame_line(function: &str, file: &str, span: Span) -> String {
    format!("at {function} ({file}:{span})")
}

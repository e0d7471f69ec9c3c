//! The cross-stage error channel.
//!
//! Every pipeline stage — lexer, parser, HIR builder, LIR builder,
//! deserializer, interpreter — reports failure the same way: a source file
//! name, a 1-based line number, and a human-readable message. Internally
//! each stage still uses `Result<T, E>` with a `thiserror` error enum and
//! `?`; `ErrorChannel` is the last-writer-wins record a host embedding this
//! as a library reads after a call fails, matching the external interface
//! in spec §6.

use std::fmt;

/// A 1-based source position used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
}

impl SourcePos {
    pub const fn new(line: u32) -> Self {
        Self { line }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// Last-writer-wins (file, line, message) record, set by every fallible
/// stage before it returns failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorChannel {
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl ErrorChannel {
    pub fn new(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.file, self.line, self.message)
    }
}

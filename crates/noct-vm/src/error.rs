//! Runtime error taxonomy (spec §7 class (f) "Runtime").

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("Broken bytecode.")]
    BrokenBytecode,
    #[error("array index out of range")]
    IndexOutOfRange,
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("call depth exceeded ({0})")]
    CallDepthExceeded(u32),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("wrong argument count: expected {expected}, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },
    #[error("{0}")]
    Native(String),
}

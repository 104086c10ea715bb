//! Runtime errors
//!
//! Errors a task can hit while the interpreter advances it. The interpreter
//! reports them through [`Runtime::send_task_error`](crate::Runtime), which
//! puts the one-byte code plus the failing location on the wire; nothing here
//! is fatal to the VM.

use thiserror::Error;

/// Task runtime errors, with their stable wire codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskError {
    #[error("unspecified error")]
    Unspecified = 1,

    #[error("bad chunk index")]
    BadChunkIndex = 2,

    #[error("insufficient memory")]
    InsufficientMemory = 3,

    #[error("needs an integer")]
    NeedsInteger = 4,

    #[error("needs a boolean")]
    NeedsBoolean = 5,

    #[error("needs a string")]
    NeedsString = 6,

    #[error("index out of range")]
    IndexOutOfRange = 7,

    #[error("division by zero")]
    DivisionByZero = 8,
}

impl TaskError {
    /// One-byte code carried in the task error message
    pub fn code(self) -> u8 {
        self as u8
    }
}

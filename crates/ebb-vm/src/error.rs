//! Runner errors

use thiserror::Error;

/// An error raised by a host-supplied native callback. It unwinds out of
/// `run()`/`resume()` unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct NativeError(pub String);

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that unwind out of a running handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    /// The instruction quota ran out. The instruction pointer is left on
    /// the opcode that was not executed, so execution can be audited.
    #[error("runtime quota exceeded")]
    QuotaExceeded,

    /// A native callback failed.
    #[error(transparent)]
    Native(#[from] NativeError),
}

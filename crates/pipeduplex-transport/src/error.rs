use std::time::Duration;

use crate::handle::PipeDirection;

/// Errors that can occur in pipe transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The OS refused to allocate a pipe.
    #[error("failed to create anonymous pipe: {0}")]
    Create(std::io::Error),

    /// A pipe handle string could not be turned into a descriptor.
    #[error("invalid pipe handle '{value}': {reason}")]
    InvalidHandle { value: String, reason: String },

    /// The descriptor named by a handle is not a usable pipe end.
    #[error("failed to attach pipe handle {fd}: {source}")]
    Attach { fd: i32, source: std::io::Error },

    /// The operation needs the opposite end of the pipe.
    #[error("pipe end is {actual}, operation requires {expected}")]
    WrongDirection {
        expected: PipeDirection,
        actual: PipeDirection,
    },

    /// The pipe end has already been closed.
    #[error("pipe end already closed")]
    Closed,

    /// The reader did not consume pending bytes in time.
    #[error("pipe drain timed out after {timeout:?} ({pending} bytes pending)")]
    DrainTimeout { pending: usize, timeout: Duration },

    /// The reading side went away while bytes were still pending.
    #[error("pipe reader closed before drain completed")]
    BrokenPipe,

    /// An I/O error occurred on the pipe.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

//! Error types recorded on tasks and returned by transports.

use std::io;

/// Failure reported by a `Transport` before a complete response was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// libcurl reported an error (timeout, connection, DNS, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// The request's cancel token fired while the transfer was in flight.
    #[error("transfer aborted by cancellation")]
    Canceled,
    /// The body sink refused data (disk full, permission denied).
    #[error("storage: {0}")]
    Sink(#[source] io::Error),
    /// Any other transport failure (used by non-curl transports).
    #[error("{0}")]
    Other(String),
}

/// Why a task ended `Failed` or `Canceled`. Stored on the task, never thrown
/// across the pool.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("transport: {0}")]
    Transport(#[source] TransportError),
    /// Non-2xx response; `message` is a snippet of the response body.
    #[error("HTTP {status}: {message}")]
    Http { status: u32, message: String },
    /// Stream ended before the declared length was reached.
    #[error("incomplete transfer: expected {expected} bytes, got {received}")]
    Incomplete { expected: u64, received: u64 },
    /// A 206 whose `Content-Range` does not begin where the part file ends.
    #[error("partial content starts at byte {got}, expected {expected}")]
    RangeMismatch { expected: u64, got: u64 },
    /// Filesystem failure (mkdir, open, write, sync, rename). Never retried.
    #[error("storage: {0}")]
    Storage(#[from] io::Error),
    /// The request's cancel token fired.
    #[error("canceled")]
    Canceled,
    /// The worker running the task panicked (e.g. in the completion hook).
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<TransportError> for TaskError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Canceled => TaskError::Canceled,
            TransportError::Sink(io) => TaskError::Storage(io),
            other => TaskError::Transport(other),
        }
    }
}

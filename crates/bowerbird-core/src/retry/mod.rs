//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures), the
//! pluggable backoff function and the per-downloader retry budget live here so
//! the transfer loop only has to ask "transient or terminal?" and "how long?".

mod classify;
mod error;
mod policy;

pub use classify::{classify_curl_error, classify_http_status, classify_transport_error};
pub use error::{TaskError, TransportError};
pub use policy::{default_backoff, Backoff, ErrorKind, RetryPolicy};

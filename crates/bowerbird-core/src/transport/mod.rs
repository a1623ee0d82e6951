//! HTTP transport seam.
//!
//! The engine consumes fully formed requests and pushes response bodies into a
//! `BodySink`. `HttpClient` is the libcurl implementation shared by all
//! workers; tests substitute their own `Transport` to count calls.

mod cancel;
mod curl_client;
mod request;

pub use cancel::CancelToken;
pub use curl_client::HttpClient;
pub use request::Request;

use crate::retry::TransportError;
use std::io;

/// Status line and length of the final (non-redirect) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    /// Declared `Content-Length`, `None` when the server did not send one.
    pub content_length: Option<u64>,
    /// First byte position of a `Content-Range: bytes S-E/T` header.
    pub range_start: Option<u64>,
}

impl ResponseHead {
    pub fn new(status: u32, content_length: Option<u64>) -> Self {
        Self {
            status,
            content_length,
            range_start: None,
        }
    }

    pub fn with_range_start(mut self, start: u64) -> Self {
        self.range_start = Some(start);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Receives a response body as it streams in.
///
/// `start` is called exactly once per completed request, before any `write`,
/// even when the body is empty. Returning an error from either aborts the
/// transfer and surfaces as `TransportError::Sink`.
pub trait BodySink {
    fn start(&mut self, head: &ResponseHead) -> io::Result<()>;
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Executes one HTTP request. Implementations must be safe to share across
/// worker threads.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, TransportError>;
}

//! In-process `Transport` doubles that count calls instead of opening sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bowerbird_core::{BodySink, Request, ResponseHead, Transport, TransportError};

type Handler = dyn Fn(usize, &Request, &mut dyn BodySink) -> Result<ResponseHead, TransportError> + Send + Sync;

/// Transport driven by a closure receiving the 0-based call number.
pub struct FnTransport {
    calls: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
    handler: Box<Handler>,
}

impl FnTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(usize, &Request, &mut dyn BodySink) -> Result<ResponseHead, TransportError> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every call answers 200 with `body`.
    pub fn serving(body: Vec<u8>) -> Self {
        Self::new(move |_, _, sink| respond(sink, 200, &body, Some(body.len() as u64)))
    }

    /// Every call fails before any response arrives.
    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_, _, _| Err(TransportError::Other(message.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }
}

impl Transport for FnTransport {
    fn execute(&self, request: &Request, sink: &mut dyn BodySink) -> Result<ResponseHead, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.ranges
            .lock()
            .unwrap()
            .push(request.header_value("range").map(str::to_string));
        (self.handler)(n, request, sink)
    }
}

/// Deliver a complete response through `sink`.
pub fn respond(
    sink: &mut dyn BodySink,
    status: u32,
    body: &[u8],
    content_length: Option<u64>,
) -> Result<ResponseHead, TransportError> {
    let head = ResponseHead::new(status, content_length);
    sink.start(&head).map_err(TransportError::Sink)?;
    if !body.is_empty() {
        sink.write(body).map_err(TransportError::Sink)?;
    }
    Ok(head)
}

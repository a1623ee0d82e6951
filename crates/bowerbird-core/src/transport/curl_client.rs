//! libcurl-backed `Transport`.

use std::cell::RefCell;
use std::io;
use std::time::Duration;

use super::{BodySink, Request, ResponseHead, Transport};
use crate::retry::TransportError;

/// Receive buffer handed to libcurl; bounds the size of each body chunk.
pub const COPY_BUFFER_BYTES: usize = 32 * 1024;

/// Shared HTTP client settings. Each `execute` builds a fresh `Easy` handle
/// from these, so one client can serve every worker concurrently.
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub connect_timeout: Duration,
    /// Abort if throughput stays below this many bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirections: u32,
    /// `http://`, `https://`, `socks5://` or `socks5h://` proxy URL.
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
            proxy: None,
            user_agent: None,
        }
    }
}

impl HttpClient {
    /// Use the first non-empty proxy URL, if any.
    pub fn with_proxy<'a>(mut self, candidates: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        self.proxy = candidates
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|p| !p.is_empty())
            .map(str::to_string);
        self
    }
}

/// Header state of the response currently being received. Reset on every
/// status line so only the final response of a redirect chain counts.
#[derive(Default)]
struct HeadState {
    status: u32,
    content_length: Option<u64>,
    range_start: Option<u64>,
    started: bool,
    sink_error: Option<io::Error>,
}

impl HeadState {
    fn feed(&mut self, line: &[u8]) {
        let Ok(line) = std::str::from_utf8(line) else {
            return;
        };
        let line = line.trim();
        if line.starts_with("HTTP/") {
            self.status = line
                .split_whitespace()
                .nth(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            self.content_length = None;
            self.range_start = None;
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                self.range_start = parse_content_range_start(value);
            }
        }
    }

    fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            content_length: self.content_length,
            range_start: self.range_start,
        }
    }
}

/// `bytes 100-199/200` -> 100. Unsatisfied (`bytes */200`) or other units -> None.
fn parse_content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}

impl Transport for HttpClient {
    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn BodySink,
    ) -> Result<ResponseHead, TransportError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(request.url())?;
        match request.method() {
            "GET" => easy.get(true)?,
            "HEAD" => easy.nobody(true)?,
            other => easy.custom_request(other)?,
        }
        easy.follow_location(true)?;
        easy.max_redirections(self.max_redirections)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(self.low_speed_limit)?;
        easy.low_speed_time(self.low_speed_time)?;
        easy.buffer_size(COPY_BUFFER_BYTES)?;
        easy.progress(true)?;
        if let Some(proxy) = &self.proxy {
            easy.proxy(proxy)?;
        }
        if let Some(ua) = &self.user_agent {
            easy.useragent(ua)?;
        }

        let mut list = curl::easy::List::new();
        for (k, v) in request.headers() {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        if !request.headers().is_empty() {
            easy.http_headers(list)?;
        }

        let state = RefCell::new(HeadState::default());
        let cancel = request.cancel_token().clone();
        let perform_result = {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                state.borrow_mut().feed(line);
                true
            })?;
            transfer.write_function(|data| {
                let mut st = state.borrow_mut();
                if !st.started {
                    st.started = true;
                    if let Err(e) = sink.start(&st.head()) {
                        st.sink_error = Some(e);
                        return Ok(0);
                    }
                }
                match sink.write(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        st.sink_error = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.progress_function(|_, _, _, _| !cancel.is_canceled())?;
            transfer.perform()
        };

        let mut st = state.into_inner();
        if let Err(e) = perform_result {
            if let Some(io_err) = st.sink_error.take() {
                return Err(TransportError::Sink(io_err));
            }
            if e.is_aborted_by_callback() && cancel.is_canceled() {
                return Err(TransportError::Canceled);
            }
            return Err(TransportError::Curl(e));
        }

        st.status = easy.response_code()?;
        let head = st.head();
        if !st.started {
            sink.start(&head).map_err(TransportError::Sink)?;
        }
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_state_tracks_final_response() {
        let mut st = HeadState::default();
        st.feed(b"HTTP/1.1 302 Found\r\n");
        st.feed(b"Content-Length: 12\r\n");
        st.feed(b"Location: /next\r\n");
        st.feed(b"\r\n");
        st.feed(b"HTTP/1.1 200 OK\r\n");
        st.feed(b"content-length: 1024\r\n");
        assert_eq!(st.head(), ResponseHead::new(200, Some(1024)));
    }

    #[test]
    fn content_range_start_is_parsed() {
        let mut st = HeadState::default();
        st.feed(b"HTTP/1.1 206 Partial Content
");
        st.feed(b"Content-Range: bytes 100-199/200
");
        assert_eq!(st.head().range_start, Some(100));
        // A new response forgets the previous range.
        st.feed(b"HTTP/1.1 200 OK
");
        assert_eq!(st.head().range_start, None);

        assert_eq!(parse_content_range_start(" bytes 0-9/*"), Some(0));
        assert_eq!(parse_content_range_start("bytes */200"), None);
        assert_eq!(parse_content_range_start("items 1-2/3"), None);
    }

    #[test]
    fn missing_length_is_unknown() {
        let mut st = HeadState::default();
        st.feed(b"HTTP/1.1 200 OK\r\n");
        st.feed(b"Transfer-Encoding: chunked\r\n");
        assert_eq!(st.head().content_length, None);
    }

    #[test]
    fn first_non_empty_proxy_wins() {
        let c = HttpClient::default().with_proxy([None, Some("  "), Some("socks5://127.0.0.1:1080"), Some("http://p:1")]);
        assert_eq!(c.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        let none = HttpClient::default().with_proxy([None, Some("")]);
        assert!(none.proxy.is_none());
    }
}

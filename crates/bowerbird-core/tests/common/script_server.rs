//! Minimal HTTP/1.1 server that answers each request from a script.
//!
//! Every connection serves one request and is closed. Replies are taken from
//! the script in order; the last one repeats once the script runs out. The
//! `Range` header of every request is recorded for assertions.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    /// Serve `body`. With `honor_range`, a `Range: bytes=K-` request gets 206
    /// and the tail (416 if K is past the end); otherwise always 200 with the
    /// whole body. `cut` closes the connection after that many body bytes
    /// while still declaring the full length.
    Body {
        body: Arc<Vec<u8>>,
        honor_range: bool,
        cut: Option<usize>,
    },
    /// Body without `Content-Length`, delimited by connection close.
    Unsized(Arc<Vec<u8>>),
    /// Bare status with a short text body.
    Status(u16, &'static str),
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Reply::Body {
            body: Arc::new(body.to_vec()),
            honor_range: true,
            cut: None,
        }
    }

    pub fn cut(body: &[u8], after: usize) -> Self {
        Reply::Body {
            body: Arc::new(body.to_vec()),
            honor_range: true,
            cut: Some(after),
        }
    }

    pub fn ignoring_range(body: &[u8]) -> Self {
        Reply::Body {
            body: Arc::new(body.to_vec()),
            honor_range: false,
            cut: None,
        }
    }
}

pub struct ScriptServer {
    pub url: String,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptServer {
    /// Starts a server in a background thread. The server runs until the
    /// process exits.
    pub fn start(script: Vec<Reply>) -> Self {
        assert!(!script.is_empty(), "script needs at least one reply");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&ranges);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let script = Arc::clone(&script);
                let log = Arc::clone(&log);
                thread::spawn(move || handle(stream, &script, &log));
            }
        });
        Self {
            url: format!("http://127.0.0.1:{}/media/file.bin", port),
            ranges,
        }
    }

    /// `Range` header of each request received so far, in arrival order.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.ranges.lock().unwrap().len()
    }
}

fn next_reply(script: &Mutex<VecDeque<Reply>>) -> Reply {
    let mut q = script.lock().unwrap();
    if q.len() > 1 {
        q.pop_front().unwrap()
    } else {
        q.front().cloned().unwrap()
    }
}

fn handle(mut stream: TcpStream, script: &Mutex<VecDeque<Reply>>, log: &Mutex<Vec<Option<String>>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let range = parse_range(&request);
    let reply = next_reply(script);
    log.lock().unwrap().push(range.clone().map(|(raw, _)| raw));
    let start = range.map(|(_, start)| start);

    match reply {
        Reply::Status(code, text) => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                code,
                reason(code),
                text.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(text.as_bytes());
        }
        Reply::Unsized(body) => {
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(&body);
        }
        Reply::Body {
            body,
            honor_range,
            cut,
        } => {
            let total = body.len();
            let (status, slice) = match start {
                Some(k) if honor_range => {
                    if k as usize >= total {
                        let head = format!(
                            "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            total
                        );
                        let _ = stream.write_all(head.as_bytes());
                        return;
                    }
                    (206, &body[k as usize..])
                }
                _ => (200, &body[..]),
            };
            let content_range = if status == 206 {
                format!("Content-Range: bytes {}-{}/{}\r\n", total - slice.len(), total - 1, total)
            } else {
                String::new()
            };
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                slice.len(),
                content_range
            );
            let _ = stream.write_all(head.as_bytes());
            let sent = cut.map_or(slice.len(), |c| c.min(slice.len()));
            let _ = stream.write_all(&slice[..sent]);
        }
    }
    let _ = stream.flush();
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8(data).ok()
}

/// Returns the raw `Range` value and its start offset for `bytes=K-`.
fn parse_range(request: &str) -> Option<(String, u64)> {
    for line in request.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                let start = value
                    .strip_prefix("bytes=")
                    .and_then(|r| r.split_once('-'))
                    .and_then(|(a, _)| a.trim().parse().ok())
                    .unwrap_or(0);
                return Some((value.to_string(), start));
            }
        }
    }
    None
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

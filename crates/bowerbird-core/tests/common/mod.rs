//! Shared fixtures for the integration tests.
#![allow(dead_code)]

pub mod fake_transport;
pub mod script_server;

use std::time::{Duration, Instant};

/// Poll `cond` until it holds or `timeout` elapses.
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Deterministic body of `len` bytes.
pub fn body(len: usize) -> Vec<u8> {
    (0u8..=250).cycle().take(len).collect()
}

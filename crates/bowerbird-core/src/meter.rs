//! Per-second byte-rate metering.
//!
//! Two levels: each task keeps a `RateWindow` updated only by the worker that
//! owns it, and every write is also sent as a byte event to a single metering
//! thread that snapshots and resets a global counter once per tick. A write
//! straddling a tick is attributed to whichever side it lands on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Length of one metering window.
pub const METER_TICK: Duration = Duration::from_secs(1);

/// Published "bytes in the last tick" gauge. Cheap to clone; readers poll it.
#[derive(Debug, Clone, Default)]
pub struct ByteRate(Arc<AtomicU64>);

impl ByteRate {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, v: u64) {
        self.0.store(v, Ordering::Relaxed);
    }
}

/// Snapshot-and-reset accumulator for a single task.
#[derive(Debug)]
pub struct RateWindow {
    bytes_now: u64,
    window_start: Instant,
    tick: Duration,
}

impl RateWindow {
    pub fn new(now: Instant) -> Self {
        Self::with_tick(now, METER_TICK)
    }

    pub fn with_tick(now: Instant, tick: Duration) -> Self {
        Self {
            bytes_now: 0,
            window_start: now,
            tick,
        }
    }

    /// Account `n` bytes written at `now`. When the window has run for a full
    /// tick, returns the bytes seen in it and opens a new window.
    ///
    /// Windows only close on a write, so a transfer that stalls mid-body keeps
    /// reporting its last published value until bytes flow again or it ends.
    pub fn record(&mut self, n: u64, now: Instant) -> Option<u64> {
        self.bytes_now += n;
        if now.duration_since(self.window_start) >= self.tick {
            let last = self.bytes_now;
            self.bytes_now = 0;
            self.window_start = now;
            Some(last)
        } else {
            None
        }
    }
}

/// Spawn the metering thread for one downloader session.
///
/// Returns the sender workers push byte counts into. The thread drains
/// events, publishes the per-tick total to `gauge`, and exits (publishing 0)
/// once `stop` is set or every sender is gone.
pub(crate) fn spawn_global_meter(
    gauge: ByteRate,
    stop: Arc<AtomicBool>,
    tick: Duration,
) -> (Sender<u64>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<u64>();
    let handle = std::thread::spawn(move || {
        let mut accumulated = 0u64;
        let mut next_tick = Instant::now() + tick;
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let now = Instant::now();
            if now >= next_tick {
                gauge.set(accumulated);
                accumulated = 0;
                next_tick += tick;
                if next_tick <= now {
                    next_tick = now + tick;
                }
                continue;
            }
            match rx.recv_timeout(next_tick - now) {
                Ok(n) => accumulated += n,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        gauge.set(0);
        tracing::debug!("global meter stopped");
    });
    (tx, handle)
}

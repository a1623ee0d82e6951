use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// High-level classification of an error for retry purposes.
///
/// Callers map HTTP status codes and transport failures into these kinds;
/// everything except `Other` is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Any other error (not retried).
    Other,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

/// Pluggable backoff strategy: `(min, max, retry_index) -> wait`.
pub type Backoff = Arc<dyn Fn(Duration, Duration, u32) -> Duration + Send + Sync>;

/// Exponential backoff: `min * 2^attempt`, capped at `max`.
///
/// Returns `max` when `min` is zero, when the exponent overflows, or when the
/// product reaches `max`.
pub fn default_backoff(min: Duration, max: Duration, attempt: u32) -> Duration {
    if min.is_zero() {
        return max;
    }
    let Some(factor) = 1u32.checked_shl(attempt) else {
        return max;
    };
    match min.checked_mul(factor) {
        Some(sleep) if sleep < max => sleep,
        _ => max,
    }
}

/// Retry budget and wait bounds shared by every worker of a `Downloader`.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per task (including the first).
    pub tries_max: u32,
    /// Lower bound handed to the backoff function.
    pub wait_min: Duration,
    /// Upper bound handed to the backoff function.
    pub wait_max: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries_max: 5,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(10),
            backoff: Arc::new(default_backoff),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("tries_max", &self.tries_max)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Replace the backoff strategy.
    pub fn with_backoff<F>(mut self, backoff: F) -> Self
    where
        F: Fn(Duration, Duration, u32) -> Duration + Send + Sync + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Wait before retry number `retry_index` (0 = first retry).
    pub fn wait(&self, retry_index: u32) -> Duration {
        (self.backoff)(self.wait_min, self.wait_max, retry_index)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.tries_max.max(1)
    }
}

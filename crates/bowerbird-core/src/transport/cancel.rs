//! Cooperative cancellation carried by a request.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Shared cancel flag. Clones observe the same state; once canceled it stays
/// canceled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    canceled: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake anyone sleeping in `wait_timeout`.
    pub fn cancel(&self) {
        let mut canceled = self
            .inner
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *canceled = true;
        self.inner.cond.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self
            .inner
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless canceled first. Returns `true` if the token
    /// was canceled (before or during the wait).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .inner
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .cond
            .wait_timeout_while(guard, timeout, |canceled| !*canceled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_canceled());
        a.cancel();
        assert!(b.is_canceled());
    }

    #[test]
    fn wait_elapses_when_not_canceled() {
        let t = CancelToken::new();
        assert!(!t.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn wait_returns_early_on_cancel() {
        let t = CancelToken::new();
        let t2 = t.clone();
        let start = Instant::now();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            t2.cancel();
        });
        assert!(t.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        h.join().unwrap();
    }

    #[test]
    fn already_canceled_does_not_sleep() {
        let t = CancelToken::new();
        t.cancel();
        let start = Instant::now();
        assert!(t.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

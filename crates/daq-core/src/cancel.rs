//! Cooperative cancellation.
//!
//! [`CancelToken`] replaces a bare "keep working" flag: sleepers wait on a
//! condition variable and are woken as soon as cancellation is requested, so a
//! long nap never delays a stop.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Resettable cancellation flag with interruptible sleeps.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = self.cancelled.lock();
        *cancelled = true;
        self.condvar.notify_all();
    }

    /// Re-arms the token for the next run.
    pub fn reset(&self) {
        *self.cancelled.lock() = false;
    }

    /// `true` between `cancel` and the next `reset`.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Sleeps for `timeout` unless cancelled first.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.condvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_sleeper_early() {
        let token = Arc::new(CancelToken::new());
        let sleeper = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.wait_timeout(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_reset_rearms() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.wait_timeout(Duration::from_secs(1)));
        token.reset();
        assert!(!token.is_cancelled());
    }
}

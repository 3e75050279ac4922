//! Cooperative cancellation shared between the engine and whoever drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How often a waiting task looks at the flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stands in for waits too long to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cloneable stop flag. Every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop at its next check.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking every 100ms to look at the flag. Returns `false` if the wait
    /// was cut short by cancellation and `true` if it ran to completion.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        let deadline = start.checked_add(duration).unwrap_or(start + FAR_FUTURE);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paused-clock timers fire on millisecond boundaries, so allow a little slack.
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(100),
            "expected about {expected:?}, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let cancel = Cancel::new();
        let start = Instant::now();
        assert!(cancel.sleep(Duration::from_secs(3)).await);
        assert_elapsed(start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_interrupted_within_a_poll_interval() {
        let cancel = Cancel::new();
        let other = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1050)).await;
            other.cancel();
        });
        let start = Instant::now();
        assert!(!cancel.sleep(Duration::from_secs(60)).await);
        assert!(start.elapsed() <= Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_sleep_when_already_cancelled() {
        let cancel = Cancel::new();
        cancel.cancel();
        assert!(!cancel.sleep(Duration::from_secs(60)).await);
    }
}

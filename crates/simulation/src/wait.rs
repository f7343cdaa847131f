//! Polling helpers for asynchronous assertions.

use std::time::Duration;

use tokio::time::Instant;

/// Poll interval used by [`eventually`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Works with paused time: each poll sleeps, which lets the runtime advance
/// the clock.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(POLL_INTERVAL).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_eventually_times_out() {
        assert!(!eventually(Duration::from_millis(50), || false).await);
    }

    #[tokio::test]
    async fn test_eventually_sees_background_change() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bump = Arc::clone(&counter);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bump.store(1, Ordering::SeqCst);
        });

        assert!(eventually(Duration::from_secs(1), || counter.load(Ordering::SeqCst) == 1).await);
    }
}

//! Abstraction for waiting between retry attempts
//!
//! Enables fast, deterministic tests without real time delays. Async shapes wait through
//! [`Sleeper::sleep`]; synchronous calls and push sources without a runtime wait through
//! [`Sleeper::block`].

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Abstraction for sleeping/waiting
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Suspend the current task.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
    /// Block the calling thread.
    fn block(&self, duration: Duration);
}

/// Production sleeper: tokio timer for tasks, `std::thread::sleep` for threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn block(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Test sleeper that doesn't actually sleep
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    fn block(&self, _duration: Duration) {}
}

/// Test sleeper that records every requested wait without waiting
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded waits, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forget recorded waits.
    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, duration: Duration) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.record(duration);
        Box::pin(async {})
    }

    fn block(&self, duration: Duration) {
        self.record(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instant_sleeper_doesnt_sleep() {
        let sleeper = InstantSleeper;
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_secs(10)).await;
        sleeper.block(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn tracking_sleeper_records_async_and_blocking_waits() {
        let sleeper = TrackingSleeper::new();

        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.block(Duration::from_millis(200));

        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);

        sleeper.clear();
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn tokio_sleeper_actually_sleeps() {
        let sleeper = TokioSleeper;
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn tokio_sleeper_blocks_outside_a_runtime() {
        let start = std::time::Instant::now();
        TokioSleeper.block(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}

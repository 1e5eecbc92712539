//! Injectable clock for retry and sampling waits.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of waits. Every suspension point in this crate goes through it.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock that records requested sleeps and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    /// Create a new fake clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// All sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sum of requested sleeps.
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_clock_records_without_sleeping() {
        let clock = FakeClock::new();
        let started = std::time::Instant::now();
        clock.sleep(Duration::from_secs(30)).await;
        clock.sleep(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(30), Duration::from_secs(5)]
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_sleeps() {
        let before = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_secs(15)).await;
        assert!(before.elapsed() >= Duration::from_secs(15));
    }
}

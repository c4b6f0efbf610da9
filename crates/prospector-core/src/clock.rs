//! Time source used by the orchestrator for polling and politeness delays.
//!
//! Every wait in a run goes through a [`Clock`], so backoff schedules and
//! readiness timeouts can be exercised in tests without real sleeping.

use std::future::Future;
use std::time::Duration;

/// Monotonic time plus an awaitable sleep.
pub trait Clock: Send + Sync + Clone + 'static {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_advances_with_sleep() {
        let clock = TokioClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(clock.now() - before >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sleep_returns_immediately() {
        let clock = TokioClock::new();
        clock.sleep(Duration::ZERO).await;
        assert_eq!(clock.now(), Duration::ZERO);
    }
}

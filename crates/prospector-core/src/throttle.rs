//! Politeness delay between consecutive jobs.
//!
//! Every job opens a fresh surface against the same external renderer, so the
//! orchestrator pauses between jobs to avoid exhausting or rate-limiting it.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use prospector_core::throttle::ThrottleConfig;
//!
//! // 1.5 s between jobs plus up to 500 ms of random jitter
//! let config = ThrottleConfig::new(Duration::from_millis(1500))
//!     .with_jitter(Duration::from_millis(500));
//! assert_eq!(config.delay, Duration::from_millis(1500));
//! ```

use std::time::Duration;

use crate::clock::Clock;

/// Configuration for the inter-job pause.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Fixed pause after a surface is released and before the next job.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    ///
    /// Set to `Duration::ZERO` for a fully fixed pause.
    pub jitter: Duration,
}

impl ThrottleConfig {
    /// Create a new config with the given delay and no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Add random jitter (uniform [0, jitter]) on top of the base delay.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the effective delay for a single pause (delay + random jitter).
    pub fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 1.5 second fixed pause.
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

/// Applies the politeness pause through a [`Clock`].
#[derive(Debug, Clone)]
pub struct Throttle<K> {
    clock: K,
    config: ThrottleConfig,
}

impl<K: Clock> Throttle<K> {
    pub fn new(clock: K, config: ThrottleConfig) -> Self {
        Self { clock, config }
    }

    /// Sleep for one effective delay. Returns the pause that was applied.
    pub async fn pause(&self) -> Duration {
        let delay = self.config.effective_delay();
        tracing::debug!(sleep_ms = %delay.as_millis(), "Politeness pause");
        self.clock.sleep(delay).await;
        delay
    }
}

// Xorshift seeded from the wall clock; jitter only, not crypto.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

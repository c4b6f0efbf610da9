use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::throttle::ThrottleConfig;

/// Lifecycle of an orchestrator: `Idle -> Running -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(RunState::Idle),
            "running" => Ok(RunState::Running),
            _ => Err(format!("Unknown run state: {}", s)),
        }
    }
}

/// Phase in which a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    AcquiringSurface,
    WaitingReady,
    Extracting,
}

/// Delay schedule between readiness polls.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl BackoffPolicy {
    /// Delay after a given failed poll (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential {
                initial,
                factor,
                max,
            } => {
                let exp = attempt.saturating_sub(1).min(32) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exp);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed(Duration::from_secs(1))
    }
}

/// Bounds for the WaitingReady phase of one job.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Wall-clock bound for the whole wait, measured from the first poll.
    pub ready_timeout: Duration,
    /// Pause after surface creation before the first poll.
    pub settle_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            ready_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1200),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Configuration for an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub poll: PollConfig,
    pub politeness: ThrottleConfig,
}

impl OrchestratorConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.poll.max_attempts = attempts;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.poll.ready_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.poll.settle_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.poll.backoff = backoff;
        self
    }

    pub fn with_politeness(mut self, politeness: ThrottleConfig) -> Self {
        self.politeness = politeness;
        self
    }

    /// Read overrides from environment variables, starting from defaults.
    ///
    /// - `PROSPECTOR_MAX_ATTEMPTS`
    /// - `PROSPECTOR_READY_TIMEOUT_MS`
    /// - `PROSPECTOR_POLL_INTERVAL_MS`
    /// - `PROSPECTOR_POLITENESS_MS`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(attempts) = parse_var(&lookup, "PROSPECTOR_MAX_ATTEMPTS")? {
            config.poll.max_attempts = u32::try_from(attempts)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "PROSPECTOR_MAX_ATTEMPTS must be between 1 and {}",
                        u32::MAX
                    ))
                })?;
        }
        if let Some(ms) = parse_var(&lookup, "PROSPECTOR_READY_TIMEOUT_MS")? {
            config.poll.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "PROSPECTOR_POLL_INTERVAL_MS")? {
            config.poll.backoff = BackoffPolicy::Fixed(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var(&lookup, "PROSPECTOR_POLITENESS_MS")? {
            config.politeness.delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, AppError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}

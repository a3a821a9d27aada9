//! Backoff schedule for transient HTTP failures.

use std::time::Duration;

/// How often and how patiently a failed request is repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Ceiling for the pause between two attempts.
    pub max_backoff: Duration,
    /// Growth factor of the pause from one retry to the next.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, never repeated.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Backoff schedule derived from a [`RetryConfig`]. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Pause before retry number `attempt` (counting from 1); `None` when
    /// the request should be given up.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }

    /// Longest a request can take through every attempt and pause, when each
    /// attempt is cut off at `attempt_timeout`.
    pub fn worst_case(&self, attempt_timeout: Duration) -> Duration {
        let attempts = self.config.max_retries + 1;
        let pauses: Duration = (1..=self.config.max_retries)
            .filter_map(|n| self.next_delay(n))
            .sum();
        attempt_timeout * attempts + pauses
    }
}

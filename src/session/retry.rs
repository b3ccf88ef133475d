use std::thread;
use std::time::Duration;

use crate::error::ConfigError;

/// Policy for retrying an operation that reported a transient condition.
///
/// Attempts are paced by `initial_delay`, multiplied by `backoff_multiplier`
/// after each attempt and capped at `max_delay`. The default is a fixed
/// 10 ms interval over at most 100 attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(100, Duration::from_millis(10))
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts, `interval` apart.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
        }
    }

    /// A policy that performs no retries (single attempt only).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting("max_attempts must be > 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidSetting(
                "backoff_multiplier must be finite and >= 1.0",
            ));
        }
        Ok(())
    }

    /// Compute the delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.backoff_multiplier == 1.0 || attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Total time spent sleeping when every attempt fails.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }

    /// Called after `failures` consecutive failed attempts. Sleeps and
    /// returns `true` if another attempt is allowed, `false` once the policy
    /// is exhausted.
    pub(crate) fn pause(&self, failures: u32) -> bool {
        if failures >= self.max_attempts {
            return false;
        }
        thread::sleep(self.delay_for_attempt(failures.saturating_sub(1)));
        true
    }
}

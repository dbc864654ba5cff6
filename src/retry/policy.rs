use std::time::Duration;

use crate::config::RetryConfig;

/// Attempt budget and backoff curve for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60), true, Duration::from_secs(3600))
    }
}

impl RetryPolicy {
    /// A budget of zero attempts is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration, exponential: bool, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            exponential,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.base_delay_secs),
            config.exponential_backoff,
            Duration::from_secs(config.max_delay_secs),
        )
    }

    /// Delay after `failed_before` earlier consumed attempts.
    ///
    /// Formula: base * 2^failed_before when exponential, else base; capped at
    /// `max_delay`. With base=60s: 60s, 120s, 240s, ...
    pub fn delay_for(&self, failed_before: u32) -> Duration {
        let base_secs = self.base_delay.as_secs();
        let secs = if self.exponential {
            let multiplier = 2u64.saturating_pow(failed_before);
            base_secs.saturating_mul(multiplier)
        } else {
            base_secs
        };
        Duration::from_secs(secs.min(self.max_delay.as_secs()))
    }
}

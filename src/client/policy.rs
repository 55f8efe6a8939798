//! Reconnection policy for [`ChatClient`](super::ChatClient)

use crate::config::ReconnectConfig;
use std::time::Duration;

/// How long to wait between reconnection attempts, and how many to make
///
/// The default retries forever with a fixed 5 second delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Maximum number of attempts (0 = unlimited)
    pub max_attempts: u32,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            max_attempts: config.max_attempts,
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.delay_ms)),
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay, unlimited attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: 0,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Cap the number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Grow the delay by `multiplier` per attempt, up to `max_delay`
    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Delay before the given attempt (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let delay = base * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_millis(delay.min(max) as u64)
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

//! Exponential-backoff schedule for push channel reconnects
//!
//! Attempts are numbered from 1. The delay before attempt `n` is
//! `base_delay * 2^n`, clamped to `max_delay`, so with the defaults the
//! schedule runs 2s, 4s, 8s, 16s, 30s and then gives up until the next
//! explicit connect.

use std::time::Duration;

use crate::config::ChannelConfig;

/// Tunable parameters for the reconnect schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First delay step; attempt 1 waits twice this
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Attempts before the channel stops retrying
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl From<&ChannelConfig> for BackoffPolicy {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt, clamped to `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(base_ms.saturating_mul(factor)).min(self.max_delay)
    }

    /// Whether `attempts` completed attempts means giving up
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

//! Connection retry policy.
//!
//! Exponential backoff with a cap and a bounded number of attempts. The
//! policy only computes delays; the caller schedules them.

use std::time::Duration;

use crate::constants;

/// Backoff policy for session creation and socket open failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures after which the pane gives up.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Random jitter added on top of each delay (zero disables it).
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::MAX_CONNECT_ATTEMPTS,
            base_delay: constants::RETRY_BASE_DELAY,
            max_delay: constants::RETRY_MAX_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// `true` once `failures` consecutive failures have used up the budget.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// Returns `None` when the budget is exhausted. Delays double per
    /// failure: base, 2×base, 4×base, ... up to `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || self.is_exhausted(failures) {
            return None;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(delay.saturating_add(self.jitter_sample()))
    }

    fn jitter_sample(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random_range(0..=max_ms))
    }
}

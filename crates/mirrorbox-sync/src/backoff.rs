//! Exponential reconnection backoff.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Doubling delay from `floor` up to `ceiling`, giving up after
/// `max_attempts` consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff at its floor.
    #[must_use]
    pub const fn new(config: &BackoffConfig) -> Self {
        Self {
            floor: config.floor,
            ceiling: config.ceiling,
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next
    /// attempt, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt += 1;
        Some(self.floor.saturating_mul(factor).min(self.ceiling))
    }

    /// Records a success.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// True once [`Backoff::next_delay`] would return `None`.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

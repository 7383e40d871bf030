//! Retry policy for retryable executor failures.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Longest delay any policy produces, whatever `max_delay_ms` says.
pub const MAX_DELAY_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Bounded exponential backoff with optional jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Failed attempts after which an action becomes FAILED
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Draw the delay uniformly from `[delay/2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Whether an action with `attempts` failures is out of retries.
    #[must_use]
    pub const fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Unjittered delay after the `attempt`-th failure (1-based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let ceiling = self.max_delay_ms.min(MAX_DELAY_MS);
        let capped = raw.min(ceiling as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay to wait after the `attempt`-th failure, jitter applied.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

//! Retry policy. Backoff timing is a pure function of the attempt index.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF_SECS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total network attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Delay after failed attempt `i` (0-based) is `backoff_base ^ i` seconds.
    pub backoff_base: f64,
    /// Add up to 25% random extra delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep to insert after failed attempt `attempt_index`.
    pub fn delay_after(&self, attempt_index: u32) -> Duration {
        let delay = backoff_delay(self.backoff_base, attempt_index);
        if self.jitter {
            let extra: f64 = rand::thread_rng().gen_range(0.0..0.25);
            delay.mul_f64(1.0 + extra)
        } else {
            delay
        }
    }
}

/// `base ^ attempt_index` seconds, capped at five minutes. Bases below one
/// are clamped to one so the delay never shrinks between attempts.
pub fn backoff_delay(base: f64, attempt_index: u32) -> Duration {
    let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
    let secs = base.max(1.0).powi(exponent);
    let secs = if secs.is_finite() {
        secs.min(MAX_BACKOFF_SECS)
    } else {
        MAX_BACKOFF_SECS
    };
    Duration::from_secs_f64(secs)
}

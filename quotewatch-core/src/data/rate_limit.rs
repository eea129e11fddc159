//! Process-wide call budget for the quote provider.
//!
//! Interval model: consecutive network calls are spaced at least
//! `60 / max_calls_per_min` seconds apart. There is no per-minute counter to
//! reset; elapsed wall-clock time alone restores the budget. The mutex is the
//! single coordination point, so the spacing holds when several symbols are
//! fetched in parallel.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::Clock;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimiter {
    /// `max_calls_per_min` of zero is treated as one.
    pub fn per_minute(max_calls_per_min: u32) -> Self {
        let calls = max_calls_per_min.max(1);
        Self {
            interval: Duration::from_secs_f64(60.0 / f64::from(calls)),
            next_allowed: Mutex::new(None),
        }
    }

    /// Spacing between calls, also used as the soft-limit cooldown.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until a call is allowed, then reserve the next slot.
    ///
    /// Returns how long the caller waited.
    pub fn acquire(&self, clock: &dyn Clock) -> Duration {
        let mut next = self.next_allowed.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = clock.now();
        let mut waited = Duration::ZERO;

        if let Some(at) = *next {
            if let Ok(wait) = (at - now).to_std() {
                if !wait.is_zero() {
                    // Sleeping under the lock queues other callers behind us.
                    clock.sleep(wait);
                    waited = wait;
                    now = clock.now();
                }
            }
        }

        *next = Some(now + to_chrono(self.interval));
        waited
    }

    /// Push the next slot to at least one interval from now. Called when the
    /// provider embeds a rate-limit warning in an otherwise successful body.
    pub fn cool_down(&self, clock: &dyn Clock) {
        let mut next = self.next_allowed.lock().unwrap_or_else(|e| e.into_inner());
        let candidate = clock.now() + to_chrono(self.interval);
        *next = Some(match *next {
            Some(at) if at > candidate => at,
            _ => candidate,
        });
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

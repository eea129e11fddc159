//! Fixed-interval scheduler for collection cycles.
//!
//! Runs a cycle immediately when `run_on_start` is set, then one per
//! interval. Waits are cut into slices of at most one second so a cancel
//! request is noticed promptly. Cycles never overlap: the next wait starts
//! after the previous cycle returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use quotewatch_core::clock::Clock;

use crate::config::SchedulerConfig;

const WAIT_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(interval: Duration, run_on_start: bool) -> Self {
        Self {
            interval,
            run_on_start,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.interval(), config.run_on_start)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `cycle` until `cancel` is set. Returns the number of cycles run.
    pub fn run(&self, clock: &dyn Clock, cancel: &AtomicBool, mut cycle: impl FnMut(u64)) -> u64 {
        let mut count = 0;
        info!(interval_secs = self.interval.as_secs(), run_on_start = self.run_on_start, "scheduler started");

        if self.run_on_start && !cancel.load(Ordering::Relaxed) {
            count += 1;
            cycle(count);
        }

        while self.wait(clock, cancel) {
            count += 1;
            cycle(count);
        }

        info!(cycles = count, "scheduler stopped");
        count
    }

    /// Sleep one interval. Returns false if cancelled.
    fn wait(&self, clock: &dyn Clock, cancel: &AtomicBool) -> bool {
        let deadline = clock.now()
            + chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::days(365));
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            let remaining = match (deadline - clock.now()).to_std() {
                Ok(d) if !d.is_zero() => d,
                _ => return true,
            };
            clock.sleep(remaining.min(WAIT_SLICE));
        }
    }
}

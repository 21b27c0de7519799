//! Time source abstraction.
//!
//! Retention accounting reads time through [`Clock`] so expiry can be driven
//! deterministically in tests.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Upper bound applied to retention windows (100 years).
const MAX_RETENTION_DAYS: i64 = 36_500;

/// Source of "now".
pub trait Clock: Send + Sync + core::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = retention_deadline(*now, by);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// `from + window`, saturating at a 100-year window.
pub fn retention_deadline(from: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(MAX_RETENTION_DAYS);
    let delta = chrono::Duration::from_std(window).unwrap_or(cap).min(cap);
    from + delta
}

//! How often to poll, and for how long.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Growth of the wait between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Backoff {
    /// Same wait every time
    #[default]
    Fixed,
    /// interval * attempt
    Linear,
    /// interval * 2^(attempt - 1)
    Exponential,
}

/// Poll schedule.
///
/// The default matches a browser-style loop: 30 polls, 2 seconds apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Polls issued before giving up (at least one poll is always made)
    pub max_attempts: u32,
    /// Base wait between polls
    pub interval: Duration,
    /// Cap on any single wait
    pub max_interval: Duration,
    pub backoff: Backoff,
    /// Jitter factor (0.0-1.0) applied to each wait
    pub jitter: f64,
    /// Wall-clock budget across all waits, if any
    pub overall_timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(2))
    }
}

impl PollPolicy {
    /// Poll `max_attempts` times, `interval` apart.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            max_interval: interval,
            backoff: Backoff::Fixed,
            jitter: 0.0,
            overall_timeout: None,
        }
    }

    /// Poll with exponentially growing waits capped at `max_interval`.
    pub fn exponential(max_attempts: u32, interval: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            max_interval,
            backoff: Backoff::Exponential,
            jitter: 0.1,
            overall_timeout: None,
        }
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait after the `attempt`-th poll (1-indexed).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.interval.as_millis() as f64;
        let cap_ms = (self.max_interval.as_millis() as f64).max(base_ms);

        let wait_ms = match self.backoff {
            Backoff::Fixed => base_ms,
            Backoff::Linear => (base_ms * attempt as f64).min(cap_ms),
            Backoff::Exponential => {
                let factor = 2_f64.powi(attempt.saturating_sub(1).min(62) as i32);
                (base_ms * factor).min(cap_ms)
            }
        };

        // Deterministic spread so many clients do not poll in lockstep.
        let spread = wait_ms * self.jitter;
        let offset = if spread > 0.0 {
            let unit = ((attempt as f64 * 37.0) % 100.0) / 100.0;
            spread * (unit - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((wait_ms + offset).max(0.0) as u64)
    }

    /// Whether another poll may follow the `attempt`-th one.
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

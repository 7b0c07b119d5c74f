//! Capped exponential backoff schedule for status polling.
//!
//! Poll intervals grow by a multiplier up to a cap, with a small
//! random jitter so many concurrent jobs do not hammer the status
//! endpoint in lockstep.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the polling schedule.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    /// Delay before the first poll.
    pub initial_delay: Duration,
    /// Upper bound on the delay between polls.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each poll.
    pub multiplier: f64,
    /// Jitter fraction applied to each delay (0.2 = +/-20%).
    pub jitter: f64,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            multiplier: 1.5,
            jitter: 0.2,
        }
    }
}

impl PollSchedule {
    /// The delay that follows `current`, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    /// Apply random jitter to a delay.
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = delay.as_millis() as f64 * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        let jittered = (delay.as_millis() as f64 + offset).max(0.0) as u64;
        Duration::from_millis(jittered)
    }
}

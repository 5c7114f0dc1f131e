//! Pause between polling rounds.
//!
//! The default is a fixed one-second pause. Setting `max_delay` above
//! `base_delay` turns it into exponential backoff capped at `max_delay`.

use std::time::Duration;

/// Backoff policy applied after a round ends with a recoverable failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Pause after the first failed round.
    pub base_delay: Duration,
    /// Upper bound for the pause.
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0) applied to the pause.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl BackoffPolicy {
    /// Same pause after every round.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Doubling pause starting at `base_delay`, capped at `max_delay`.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Pause after failed round `round` (1-based).
    pub fn delay_for(&self, round: u32) -> Duration {
        let round = round.max(1);
        let base_secs = self.base_delay.as_secs_f64();
        let max_secs = self.max_delay.as_secs_f64().max(base_secs);

        let multiplier = 2_u32.saturating_pow(round.saturating_sub(1)) as f64;
        let mut delay = (base_secs * multiplier).min(max_secs);

        if self.jitter > 0.0 && delay > 0.0 {
            let jitter = (fastrand::f64() * 2.0 - 1.0) * self.jitter;
            delay = (delay * (1.0 + jitter)).max(0.0);
        }

        Duration::from_secs_f64(delay)
    }
}

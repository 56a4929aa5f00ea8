//! Reconnection delays.

use std::time::Duration;

/// Bounded exponential backoff.
///
/// The delay before attempt `n` (0-indexed) is
/// `initial_delay * multiplier^n`, capped at `max_delay`. With
/// `max_attempts = None` the client retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// Create a new backoff policy.
    ///
    /// A `multiplier` of 0 is treated as 1.
    #[must_use]
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier: multiplier.max(1),
            max_attempts,
        }
    }

    /// A policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1, Some(0))
    }

    /// Delay before reconnection attempt `attempt`, or `None` to give up.
    #[must_use]
    pub fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = self.multiplier.saturating_pow(exponent);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }

    /// Whether attempt `attempt` is allowed.
    #[must_use]
    pub fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before the first attempt.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on any delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2, None)
    }
}

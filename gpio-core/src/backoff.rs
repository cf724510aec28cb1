//! Reconnect backoff.
//!
//! Uses exponential backoff with random jitter so that a fleet of bridges
//! does not reconnect in lock-step after a broker restart.
//!
//! Formula: min(max, initial * 2^(attempt - 1)) + random(0..=1000ms)

use std::time::Duration;

/// Upper bound of the random jitter added to every delay.
const MAX_JITTER_MS: u64 = 1000;

/// Delay schedule for broker reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap on the exponential part of the delay.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy from initial and maximum delays in seconds.
    pub fn from_secs(initial: u64, max: u64) -> Self {
        Self {
            initial: Duration::from_secs(initial),
            max: Duration::from_secs(max.max(initial)),
        }
    }

    /// Delay before retry number `attempt` (1-based), jitter excluded.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial
            .saturating_mul(1u32 << exponent)
            .min(self.max)
    }

    /// Delay before retry number `attempt` (1-based), jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + Duration::from_millis(random_jitter_ms())
    }
}

/// Generate random jitter between 0 and [`MAX_JITTER_MS`] milliseconds.
///
/// Falls back to no jitter if the OS random source is unavailable.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % (MAX_JITTER_MS + 1),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = ReconnectPolicy::from_secs(1, 30);
        assert_eq!(policy.base_delay(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay(3), Duration::from_secs(4));
        assert_eq!(policy.base_delay(5), Duration::from_secs(16));
        assert_eq!(policy.base_delay(6), Duration::from_secs(30));
        assert_eq!(policy.base_delay(100), Duration::from_secs(30));
    }

    #[test]
    fn attempt_zero_treated_as_first() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay(0), policy.initial);
    }

    #[test]
    fn max_never_below_initial() {
        let policy = ReconnectPolicy::from_secs(10, 2);
        assert_eq!(policy.max, Duration::from_secs(10));
        assert_eq!(policy.base_delay(4), Duration::from_secs(10));
    }

    #[test]
    fn jitter_is_bounded() {
        let policy = ReconnectPolicy::from_secs(2, 30);
        for attempt in 1..10 {
            let delay = policy.delay(attempt);
            let base = policy.base_delay(attempt);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_millis(MAX_JITTER_MS));
        }
    }
}

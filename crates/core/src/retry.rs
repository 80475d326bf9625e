//! Bounded retry policy for transient store failures.
//!
//! Injected as configuration rather than hard-coded so callers control the
//! attempt budget and backoff schedule.

use std::time::Duration;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Default upper bound on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// A policy with `max_attempts` attempts and no waiting in between.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts were made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// The full backoff schedule, one entry per retry.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.attempts()).map(|a| self.delay_after(a)).collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: 2,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 10,
            max_delay: Duration::from_secs(30),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(10));
        assert_eq!(policy.delay_after(3), Duration::from_secs(30));
        assert_eq!(policy.delay_after(9), Duration::from_secs(30));
    }

    #[test]
    fn none_allows_exactly_one_attempt() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1));
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn zero_attempts_treated_as_one() {
        let policy = RetryPolicy::immediate(0);
        assert_eq!(policy.attempts(), 1);
        assert!(!policy.should_retry(1));
    }
}

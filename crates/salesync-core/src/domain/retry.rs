//! Bounded exponential backoff for transient channel failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry budget applied to sync requests that fail with a transient error
///
/// The delay before attempt `n` (1-based count of failures so far) is
/// `base_delay * 2^(n-1)`, capped at `max_delay`. Once `max_attempts`
/// transient failures have been recorded the request escalates to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy with zero delays, for tests and one-shot runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the `failures`-th transient failure
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let multiplier = 2u32.saturating_pow(exponent);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// True when `failures` transient failures exhaust the budget
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(policy.next_delay(1), Duration::from_secs(1));
        assert_eq!(policy.next_delay(2), Duration::from_secs(2));
        assert_eq!(policy.next_delay(3), Duration::from_secs(4));
        assert_eq!(policy.next_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(50, Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(policy.next_delay(10), Duration::from_secs(60));
        assert_eq!(policy.next_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::immediate(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert_eq!(policy.next_delay(1), Duration::ZERO);
    }
}

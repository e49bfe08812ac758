//! Backoff policy for retrying backlog claims.

use std::time::Duration;

use skillex_core::defaults::{
    CLAIM_RETRY_ATTEMPTS, CLAIM_RETRY_BASE_MS, CLAIM_RETRY_MAX_MS, CLAIM_RETRY_MULTIPLIER,
};

/// Exponential backoff: `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total tries, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(CLAIM_RETRY_BASE_MS),
            multiplier: CLAIM_RETRY_MULTIPLIER,
            max_delay: Duration::from_millis(CLAIM_RETRY_MAX_MS),
            max_attempts: CLAIM_RETRY_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Policy that tries once and never waits.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Delay after the `attempts`-th failed try (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_exponential_backoff_with_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Duration::from_millis(200));
        assert_eq!(policy.next_delay(2), Duration::from_millis(400));
        assert_eq!(policy.next_delay(3), Duration::from_millis(800));
        assert_eq!(policy.next_delay(7), Duration::from_secs(10));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempt_uses_base() {
        assert_eq!(RetryPolicy::default().next_delay(0), Duration::from_millis(200));
    }

    #[test]
    fn test_none_tries_once() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }
}

//! Transport retry policy
//!
//! Only `TransportFailure { retryable: true }` is ever retried, and always with
//! the same expected version. Conflicts are never retried here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    #[inline]
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`
    #[inline]
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_retries() {
        assert!(!RetryPolicy::none().allows_retry_after(1));
    }

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    }
}

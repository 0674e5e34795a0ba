//! Exponential backoff for retried imports.

use crate::config::Config;
use rand::{thread_rng, Rng};
use std::time::Duration;

/// Upper bound on any single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts in total.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: MAX_DELAY,
            jitter_fraction: 0.0,
        }
    }

    /// Builds the import policy described by `config`.
    #[must_use]
    pub fn for_imports(config: &Config) -> Self {
        Self::exponential(
            config.import_attempts,
            Duration::from_millis(config.import_retry_base_delay_ms),
        )
        .with_jitter(0.25)
    }

    /// Caps each delay at `max_delay`.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Spreads each delay by up to `fraction` in either direction.
    #[must_use]
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Returns the total number of attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Starts tracking one retried operation.
    #[must_use]
    pub fn handle(&self) -> RetryHandle {
        RetryHandle {
            policy: self.clone(),
            attempts: 1,
        }
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = retry.saturating_sub(1).min(31);
        let raw = self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay);
        if self.jitter_fraction <= 0.0 {
            return raw;
        }
        let factor = thread_rng().gen_range(1.0 - self.jitter_fraction..=1.0 + self.jitter_fraction);
        raw.mul_f64(factor)
    }
}

/// Attempt counter for one retried operation.
#[derive(Debug)]
pub struct RetryHandle {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryHandle {
    /// Returns the delay before the next attempt, or `None` once every
    /// attempt is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for_retry(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Returns the number of attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_exhausted() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(10));
        let mut handle = policy.handle();
        assert_eq!(handle.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(handle.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(handle.next_delay(), Some(Duration::from_millis(40)));
        assert_eq!(handle.next_delay(), None);
        assert_eq!(handle.attempts(), 4);
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut handle = RetryPolicy::exponential(1, Duration::from_millis(10)).handle();
        assert_eq!(handle.next_delay(), None);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(150));
        let mut handle = policy.handle();
        handle.next_delay();
        assert_eq!(handle.next_delay(), Some(Duration::from_millis(150)));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy::exponential(2, Duration::from_millis(100)).with_jitter(0.25);
        for _ in 0..50 {
            let delay = policy.handle().next_delay().unwrap();
            assert!(delay >= Duration::from_millis(75) && delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn import_policy_follows_config() {
        let config = Config::new().import_attempts(5);
        assert_eq!(RetryPolicy::for_imports(&config).max_attempts(), 5);
    }
}

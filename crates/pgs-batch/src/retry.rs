//! pgs-batch: retry
//!
//! Bounded exponential backoff as an explicit counter plus next delay. No
//! hidden loops: the orchestrator owns the attempt loop and asks the policy
//! how long to wait.

use std::time::Duration;

use pgs_client::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, given `attempt` (1-based) just
    /// failed. Grows geometrically and is clamped to `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_backoff
        }
    }

    /// Delay before retrying after `err`. A rate limit waits at least as long
    /// as the service asked, even past `max_backoff`.
    pub fn delay_for(&self, attempt: u32, err: &ServiceError) -> Duration {
        let backoff = self.backoff_after(attempt);
        match err {
            ServiceError::RateLimited {
                retry_after: Some(d),
            } => backoff.max(*d),
            _ => backoff,
        }
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Blocking wait between attempts and batches. Swapped for a recorder in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_then_caps() {
        let p = policy();
        let secs: Vec<u64> = (1..=5).map(|a| p.backoff_after(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn rate_limit_honors_retry_after() {
        let p = policy();
        let err = ServiceError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(p.delay_for(1, &err), Duration::from_secs(30));

        let short = ServiceError::RateLimited {
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(p.delay_for(3, &short), Duration::from_secs(4));
    }

    #[test]
    fn exhausted_at_max_attempts() {
        let p = policy();
        assert!(!p.exhausted(4));
        assert!(p.exhausted(5));
    }
}

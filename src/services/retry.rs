//! Retry policy with fixed or exponential backoff.
//!
//! One policy is applied by the sync driver to every upstream fetch and to
//! every failed upsert chunk.

use crate::services::vci::FetchErrorKind;
use std::time::Duration;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^retry`, capped at `max`, optionally with +/- 50% jitter
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based: the first retry is 0)
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let seconds = base.as_secs_f64() * factor.powi(retry as i32);
                let capped = seconds.min(max.as_secs_f64());
                let mut delay = Duration::from_secs_f64(capped.max(0.0));

                if jitter && !delay.is_zero() {
                    let half_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let offset = rand::random::<u64>() % (half_ms * 2 + 1);
                    let total_ms = delay.as_millis() as i64 + offset as i64 - half_ms as i64;
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 1 disables retries
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Fetch outcomes worth another attempt. `Blocked` and `NoData` are
    /// never retried even when listed.
    pub retryable: Vec<FetchErrorKind>,
    /// Resubmit failed upsert chunks under the same schedule
    pub retry_failed_chunks: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retryable: vec![FetchErrorKind::Timeout, FetchErrorKind::HttpError],
            retry_failed_chunks: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Whether a fetch that failed with `kind` on attempt `attempt` (1-based)
    /// should be tried again
    pub fn should_retry(&self, kind: FetchErrorKind, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match kind {
            FetchErrorKind::Blocked | FetchErrorKind::NoData => false,
            other => self.retryable.contains(&other),
        }
    }

    /// Whether a failed chunk should be resubmitted after `attempt` tries
    pub fn should_retry_chunk(&self, attempt: u32) -> bool {
        self.retry_failed_chunks && attempt < self.max_attempts
    }

    /// Delay after attempt `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(1500),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(1500));
        assert_eq!(backoff.delay(7), Duration::from_millis(1500));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(10),
            jitter: false,
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(4));
        assert_eq!(backoff.delay(2), Duration::from_secs(8));
        assert_eq!(backoff.delay(3), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_half() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(1000),
            factor: 1.0,
            max: Duration::from_secs(5),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_blocked_and_no_data_never_retried() {
        let policy = RetryPolicy {
            max_attempts: 5,
            retryable: vec![
                FetchErrorKind::Blocked,
                FetchErrorKind::NoData,
                FetchErrorKind::Timeout,
            ],
            ..RetryPolicy::default()
        };
        assert!(!policy.should_retry(FetchErrorKind::Blocked, 1));
        assert!(!policy.should_retry(FetchErrorKind::NoData, 1));
        assert!(policy.should_retry(FetchErrorKind::Timeout, 1));
        assert!(!policy.should_retry(FetchErrorKind::Unknown, 1));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::fixed(Duration::ZERO, 2);
        assert!(policy.should_retry(FetchErrorKind::Timeout, 1));
        assert!(!policy.should_retry(FetchErrorKind::Timeout, 2));
        assert!(policy.should_retry_chunk(1));
        assert!(!policy.should_retry_chunk(2));

        let none = RetryPolicy::no_retry();
        assert!(!none.should_retry(FetchErrorKind::Timeout, 1));
        assert!(!none.should_retry_chunk(1));
    }
}

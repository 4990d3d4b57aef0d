//! Retry with exponential backoff for backend writes

use std::time::Duration;

use crate::error::SinkError;

/// How often and how patiently a single backend write is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay unit; attempt `n` waits `base_delay * 2^n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// No retries at all
    pub const fn none() -> Self {
        Self::new(0)
    }

    /// Exponential backoff: 2^attempt units (2s, 4s, 8s, ... with the default unit)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Retry a fallible write with exponential backoff.
///
/// Retries only errors classified as retryable, up to `policy.max_retries`.
/// Returns the first success or the final error.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: RetryPolicy,
    mut attempt_fn: impl FnMut() -> Result<T, SinkError>,
) -> Result<T, SinkError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying...",
                    policy.max_retries
                );
                std::thread::sleep(policy.backoff(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    fn transient() -> SinkError {
        SinkError::Store {
            key: "k".into(),
            status: Some(503),
            message: "slow down".into(),
        }
    }

    #[test]
    fn backoff_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let out = retry_with_backoff("k", instant(3), || {
            calls += 1;
            if calls < 3 { Err(transient()) } else { Ok(calls) }
        });
        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let mut calls = 0;
        let out: Result<(), _> = retry_with_backoff("k", instant(2), || {
            calls += 1;
            Err(transient())
        });
        assert!(out.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_error_is_not_retried() {
        let mut calls = 0;
        let out: Result<(), _> = retry_with_backoff("k", instant(5), || {
            calls += 1;
            Err(SinkError::InvalidKey("../x".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}

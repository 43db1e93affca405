use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Bounded retry with exponential backoff for store operations.
///
/// Attempt 1 runs immediately; attempt `n` (n >= 2) waits
/// `base_delay_ms * 2^(n-2)`, capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn delay_before(&self, attempt_number: u32) -> Duration {
        if attempt_number <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt_number - 2).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        key,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay_ms: 500,
            max_delay_ms: 3_000,
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1_000));
        assert_eq!(policy.delay_before(4), Duration::from_millis(2_000));
        assert_eq!(policy.delay_before(5), Duration::from_millis(3_000));
        assert_eq!(policy.delay_before(40), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::default()
            .run("data/x.csv", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StoreError::Network {
                        message: "connection reset".into(),
                        retryable: true,
                    })
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_access_denied() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("models/m.joblib", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::AccessDenied {
                    bucket: "b".into(),
                    key: "models/m.joblib".into(),
                    message: "403".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(StoreError::AccessDenied { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 10,
        };
        let counter = &calls;
        let result: Result<(), _> = policy
            .run("k", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Network {
                    message: "timeout".into(),
                    retryable: true,
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

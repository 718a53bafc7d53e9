//! Exponential backoff with full jitter for transient RPC failures.
//!
//! Transient classes (429, 5xx, network) are retried; permanent classes
//! fail immediately. Delays follow full jitter: each wait is uniform in
//! `[0, min(cap, base * 2^attempt)]`.

use std::time::Duration;

use rand::Rng;

/// Default base delay.
const DEFAULT_BASE: Duration = Duration::from_millis(500);
/// Default delay cap.
const DEFAULT_CAP: Duration = Duration::from_secs(15);
/// Default maximum attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay before jitter.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Total attempts (first try included).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            cap: DEFAULT_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Computes the full-jitter delay for a 0-based attempt index.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);
        if exp.is_zero() {
            return Duration::ZERO;
        }
        let jittered = rand::rng().random_range(0..=exp.as_millis());
        Duration::from_millis(u64::try_from(jittered).unwrap_or(u64::MAX))
    }
}

/// Whether a failed operation should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limit, server error, or network failure — retry with backoff.
    Transient,
    /// Invalid payload, auth failure — fail immediately.
    Permanent,
}

impl FailureClass {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        if status == 429 || status >= 500 {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Runs `op` with the policy, retrying transient failures.
///
/// `op` returns `Err((class, message))`; permanent failures and exhausted
/// retries surface the final message along with the attempt count via
/// `on_exhausted`.
///
/// # Errors
///
/// Returns the error produced by `on_exhausted` once `op` permanently
/// fails or the attempt budget is spent.
pub async fn with_retry<T, E, F, Fut, X>(
    policy: RetryPolicy,
    mut op: F,
    on_exhausted: X,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, (FailureClass, String)>>,
    X: FnOnce(FailureClass, String, u32) -> E,
{
    let attempts = policy.max_attempts.max(1);
    let mut last: Option<String> = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err((FailureClass::Permanent, message)) => {
                return Err(on_exhausted(FailureClass::Permanent, message, attempt + 1));
            }
            Err((FailureClass::Transient, message)) => {
                tracing::debug!(attempt, message, "transient failure, backing off");
                last = Some(message);
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(on_exhausted(
        FailureClass::Transient,
        last.unwrap_or_else(|| "unknown transient failure".to_string()),
        attempts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_failure_class_from_status() {
        assert_eq!(FailureClass::from_status(429), FailureClass::Transient);
        assert_eq!(FailureClass::from_status(500), FailureClass::Transient);
        assert_eq!(FailureClass::from_status(503), FailureClass::Transient);
        assert_eq!(FailureClass::from_status(400), FailureClass::Permanent);
        assert_eq!(FailureClass::from_status(401), FailureClass::Permanent);
    }

    #[test]
    fn test_delay_bounded_by_cap() {
        let policy = RetryPolicy {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(15),
            max_attempts: 5,
        };
        for attempt in 0..10 {
            assert!(policy.delay_for(attempt) <= Duration::from_secs(15));
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_attempts: 5,
        };

        let result: Result<u32, String> = with_retry(
            policy,
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err((FailureClass::Transient, "503".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            },
            |_, msg, attempts| format!("{msg} after {attempts}"),
        )
        .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy::default();

        let result: Result<u32, String> = with_retry(
            policy,
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err((FailureClass::Permanent, "bad payload".to_string()))
                }
            },
            |_, msg, _| msg,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(1),
            max_attempts: 3,
        };

        let result: Result<u32, (String, u32)> = with_retry(
            policy,
            || async { Err((FailureClass::Transient, "down".to_string())) },
            |_, msg, attempts| (msg, attempts),
        )
        .await;

        assert_eq!(result.err(), Some(("down".to_string(), 3)));
    }
}

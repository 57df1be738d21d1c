use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Settings;
use crate::types::error::TdhError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            attempts: settings.retry_attempts.max(1),
            initial: settings.retry_initial,
            max: settings.retry_max,
        }
    }
}

/// Runs `op` until it succeeds, doubling the delay after each retriable
/// failure. Non-retriable errors and the last failure are returned as is.
pub async fn with_backoff<T, F, Fut>(what: &str, policy: RetryPolicy, mut op: F) -> Result<T, TdhError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TdhError>>,
{
    let mut delay = policy.initial;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt < policy.attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what,
                    attempt,
                    policy.attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                delay = (delay * 2).min(policy.max);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempt(s): {}", what, attempt, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("fetch", policy(5), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TdhError::InputIncomplete("transfers".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("fetch", policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TdhError::InputIncomplete("links".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invariant_violation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("rank", policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TdhError::InvariantViolation("ranks".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

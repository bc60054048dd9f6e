//! Bounded retry of optimistic-concurrency losses.
//!
//! A lost version check surfaces as [`certis_auth::AuthError::ConcurrentUpdate`]. The
//! helpers here re-run the *whole* operation, so every precondition is read
//! and evaluated again before the next commit attempt.

use certis_auth::AuthResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for conflict retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Base for exponential backoff
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that returns the first conflict to the caller.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Run `op`, re-running it while it fails with a retryable error and the
/// retry budget lasts.
///
/// Non-retryable errors are returned immediately.
pub async fn retry_on_conflict<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> AuthResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AuthResult<T>>,
{
    let mut retries = 0;
    let mut delay = policy.initial_delay;

    loop {
        match op().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::debug!(retries, "Operation succeeded after conflict retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if retries >= policy.max_retries => {
                tracing::warn!(retries, error = %e, "Conflict retries exhausted");
                return Err(e);
            }
            Err(e) => {
                retries += 1;
                tracing::debug!(
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Concurrent update, re-evaluating"
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * policy.exponential_base).min(policy.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certis_auth::AuthError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
        }
    }

    #[test]
    fn test_default_policy_retries_once() {
        assert_eq!(RetryPolicy::default().max_retries, 1);
        assert_eq!(RetryPolicy::no_retry().max_retries, 0);
    }

    #[tokio::test]
    async fn test_retries_conflict_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_on_conflict(&fast(), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AuthError::ConcurrentUpdate("lost race".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: AuthResult<()> = retry_on_conflict(&fast(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::ConcurrentUpdate("lost race".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(AuthError::ConcurrentUpdate(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: AuthResult<()> = retry_on_conflict(&fast(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::Conflict("duplicate".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(AuthError::Conflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

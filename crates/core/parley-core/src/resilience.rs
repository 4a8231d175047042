//! Retry policy shared by every model-facing generator

use crate::{ParleyError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often and how patiently an operation is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts; `None` retries until success or cancellation
    pub max_attempts: Option<usize>,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Backoff multiplier applied after each failure
    pub multiplier: f64,
    /// Upper bound on a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Unbounded exponential backoff from one second, capped at five minutes.
    ///
    /// Production default for label and payload generation.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }

    /// Exponential backoff with an attempt bound
    pub fn bounded(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            initial_delay,
            ..Self::unbounded()
        }
    }

    /// Constant delay between a fixed number of attempts
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Replace the attempt bound (`0` means unbounded)
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = (max_attempts > 0).then_some(max_attempts);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }

    fn exhausted(&self, attempt: usize) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Run `op` until it succeeds, fails fatally, the policy is exhausted or
/// `cancel` fires.
///
/// `op` receives the 1-based attempt number. Errors for which
/// [`ParleyError::is_retryable`] is false are returned immediately.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ParleyError::cancelled(operation));
        }
        attempt += 1;

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if policy.exhausted(attempt) {
            warn!(operation, attempts = attempt, error = %err, "Retry policy exhausted");
            return Err(ParleyError::retry_exhausted(
                operation,
                attempt,
                err.to_string(),
            ));
        }

        let delay = policy.delay_for(attempt);
        debug!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ParleyError::cancelled(operation)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::bounded(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_doubles_from_one_second() {
        let policy = RetryPolicy::unbounded();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(60), Duration::from_secs(300));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), policy.delay_for(3));
        assert_eq!(policy.with_max_attempts(0).max_attempts, None);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = retry_with_policy(&quick(5), &CancellationToken::new(), "op", |attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(ParleyError::parse("not yet"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let result: Result<()> =
            retry_with_policy(&quick(2), &CancellationToken::new(), "label", |_| async {
                Err(ParleyError::model("503"))
            })
            .await;

        match result {
            Err(ParleyError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<()> =
            retry_with_policy(&quick(5), &CancellationToken::new(), "op", |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ParleyError::config("unknown provider"))
                }
            })
            .await;

        assert!(matches!(result, Err(ParleyError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_unbounded_loop() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<()> =
            retry_with_policy(&RetryPolicy::unbounded(), &cancel, "label", |_| {
                trigger.cancel();
                async { Err(ParleyError::model("down")) }
            })
            .await;

        assert!(matches!(result, Err(ParleyError::Cancelled(_))));
    }
}

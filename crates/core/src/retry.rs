//! Retry and poll primitives
//!
//! The provider is eventually consistent: freshly created resources can be
//! invisible to the next call, and throttling is routine. Every mutation the
//! orchestrators issue goes through [`retry`]; state transitions that the
//! provider confirms as a binary condition (all instances running, all
//! terminated) are watched with [`wait_for`], which polls at a fixed interval
//! and never backs off.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry envelope for exactly one operation, constructed per call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (coerced to at least 1)
    pub attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failure (coerced to >= 1.0)
    pub multiplier: f64,
    /// Label prepended to the surfaced error
    pub label: String,
}

impl RetryPolicy {
    /// Policy with the crate defaults: 5 attempts, 500ms initial delay,
    /// doubling each time.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            label: label.into(),
        }
    }

    /// Set the attempt budget
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier < 1.0 { 1.0 } else { multiplier };
        self
    }
}

/// Run `op` under `policy`, retrying transient failures with exponential
/// backoff. Non-retryable errors (per [`Error::is_non_retryable`]) surface
/// immediately. The surfaced error always carries the policy label.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(policy, |err| err.is_non_retryable(), op).await
}

/// [`retry`] with an explicit non-retryable classifier.
pub async fn retry_with<T, F, Fut, P>(policy: RetryPolicy, non_retryable: P, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let mut remaining = policy.attempts.max(1);
    let multiplier = if policy.multiplier < 1.0 {
        1.0
    } else {
        policy.multiplier
    };
    let mut delay = policy.initial_delay;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if non_retryable(&err) => {
                return Err(Error::Provider {
                    label: policy.label,
                    message: err.to_string(),
                });
            }
            Err(err) => {
                remaining -= 1;
                if remaining == 0 {
                    return Err(Error::Provider {
                        label: policy.label,
                        message: err.to_string(),
                    });
                }
                debug!(
                    label = %policy.label,
                    remaining,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {err}"
                );
                tokio::time::sleep(delay).await;
                delay = Duration::from_secs_f64(delay.as_secs_f64() * multiplier);
            }
        }
    }
}

/// Poll `predicate` at a fixed interval until it reports the condition holds
/// (`Ok`) or the attempt budget runs out.
///
/// Any `Err` from the predicate burns one attempt and is re-polled; a
/// divergent fleet is a reason to look again, not to give up. Exhaustion
/// surfaces as [`Error::Timeout`] carrying the label and the last failure.
pub async fn wait_for<F, Fut>(
    label: &str,
    interval: Duration,
    max_attempts: u32,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut remaining = max_attempts.max(1);
    loop {
        match predicate().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                remaining -= 1;
                if remaining == 0 {
                    return Err(Error::Timeout {
                        label: label.to_string(),
                        message: err.to_string(),
                    });
                }
                debug!(label, remaining, "condition not met, polling again: {err}");
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{provider, validation};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(label: &str, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(label)
            .with_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(quick("flaky", 3), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(provider("flaky", "not yet"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget_with_label() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(quick("doomed-op", 2), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(provider("inner", "boom"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("doomed-op"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(quick("guarded", 5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(validation("missing pid"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_coerces_zero_attempts() {
        let result = retry(quick("coerced", 1).with_attempts(0), || async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn test_multiplier_coercion() {
        let policy = RetryPolicy::new("x").with_multiplier(0.5);
        assert_eq!(policy.multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_second_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = wait_for("booting", Duration::from_millis(1), 5, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(provider("describe", "still pending"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let result = wait_for("never", Duration::from_millis(1), 1, || async {
            Err(provider("describe", "still pending"))
        })
        .await;

        match result {
            Err(Error::Timeout { label, .. }) => assert_eq!(label, "never"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}

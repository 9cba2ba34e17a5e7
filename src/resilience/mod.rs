//! Resilience layer for calls into the external collaboration API.
//!
//! Provides error classification and retry with exponential backoff. Retry
//! is an explicit classify-then-decide loop: every attempt's error is
//! re-classified, so a transient-to-permanent transition stops retrying
//! immediately instead of exhausting the budget.

mod backoff;
mod classify;

pub use backoff::ExponentialBackoff;
pub use classify::{ErrorKind, classify};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::OperationError;
use crate::upstream::UpstreamError;

/// Boxed future returned by a protected call.
pub type UpstreamFuture<T> = BoxFuture<'static, Result<T, UpstreamError>>;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
    /// Up to 3 retries (4 total attempts) with 2s/4s/8s delays.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Runs a protected call, retrying transient failures.
///
/// The backoff sleep is a plain `tokio::time::sleep` with no lock held, so
/// concurrent requests from the same or other tenants proceed while one
/// request waits between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails permanently, or exhausts the
    /// retry budget.
    ///
    /// The escalated error carries the last observed upstream error, the
    /// total attempt count, and a correlation id; per-attempt history lives
    /// only in logs.
    pub async fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T, OperationError>
    where
        F: FnMut() -> UpstreamFuture<T>,
    {
        let correlation_id = Uuid::new_v4();
        let mut attempt: u32 = 1;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt == 1 {
                        tracing::debug!(operation, "upstream call succeeded");
                    } else {
                        tracing::info!(
                            operation,
                            attempts = attempt,
                            "upstream call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = classify(&err);

                    if kind.is_retryable() && attempt <= self.policy.max_retries {
                        let delay = self.policy.backoff.delay_for(attempt);
                        tracing::warn!(
                            operation,
                            attempt,
                            error_code = %err.code(),
                            delay_ms = delay.as_millis() as u64,
                            "transient upstream failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    match kind {
                        ErrorKind::Unknown => tracing::error!(
                            operation,
                            attempts = attempt,
                            error_code = %err.code(),
                            %correlation_id,
                            "unclassified upstream failure, not retrying"
                        ),
                        _ => tracing::warn!(
                            operation,
                            attempts = attempt,
                            classification = %kind,
                            error_code = %err.code(),
                            %correlation_id,
                            "upstream call failed"
                        ),
                    }

                    return Err(OperationError::UpstreamFailed {
                        operation: operation.to_string(),
                        kind,
                        attempts: attempt,
                        correlation_id,
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing_call(
        calls: Arc<AtomicU32>,
        errors: Vec<UpstreamError>,
    ) -> impl FnMut() -> UpstreamFuture<u32> {
        move || {
            let calls = Arc::clone(&calls);
            let errors = errors.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
                Err(errors
                    .get(n.min(errors.len() - 1))
                    .cloned()
                    .unwrap_or_else(|| UpstreamError::api(503, "unavailable")))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let result = executor
            .run(
                "share-library",
                failing_call(Arc::clone(&calls), vec![UpstreamError::api(503, "down")]),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(OperationError::UpstreamFailed { kind, attempts, .. }) => {
                assert_eq!(kind, ErrorKind::Transient);
                assert_eq!(attempts, 4);
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let result = executor
            .run(
                "share-library",
                failing_call(Arc::clone(&calls), vec![UpstreamError::api(404, "gone")]),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(OperationError::UpstreamFailed { kind, attempts, .. }) => {
                assert_eq!(kind, ErrorKind::Permanent);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_error_fails_closed() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let result = executor
            .run(
                "share-library",
                failing_call(Arc::clone(&calls), vec![UpstreamError::api(302, "moved")]),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(OperationError::UpstreamFailed {
                kind: ErrorKind::Unknown,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_permanent_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let result = executor
            .run(
                "share-library",
                failing_call(
                    Arc::clone(&calls),
                    vec![
                        UpstreamError::api(503, "down"),
                        UpstreamError::api(403, "forbidden"),
                    ],
                ),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(OperationError::UpstreamFailed { kind, attempts, .. }) => {
                assert_eq!(kind, ErrorKind::Permanent);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let started = tokio::time::Instant::now();
        let inner = Arc::clone(&calls);
        let result = executor
            .run("share-library", move || {
                let calls = Arc::clone(&inner);
                Box::pin(async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(UpstreamError::api(503, "down"))
                    } else {
                        Ok(42u32)
                    }
                })
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoff sleeps: 2s then 4s.
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryPolicy::no_retry());

        let result = executor
            .run(
                "share-library",
                failing_call(Arc::clone(&calls), vec![UpstreamError::api(503, "down")]),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }
}

//! Timeout, cancellation and retry around a single upstream call

use super::UpstreamError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Policy applied to every embed, search and completion call
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Upper bound for one attempt
    pub timeout: Duration,
    /// Extra attempts after the first failure (0 disables retry)
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Run `call` until it succeeds, fails permanently, runs out of retries,
    /// or `cancel` fires
    ///
    /// # Arguments
    /// * `operation` - Short label used in errors and logs
    /// * `cancel` - Aborts the in-flight attempt and any pending backoff
    /// * `call` - Produces a fresh future per attempt
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled { operation }),
                result = tokio::time::timeout(self.timeout, call()) => result,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => UpstreamError::Timeout {
                    operation,
                    after: self.timeout,
                },
            };

            if attempt >= self.max_retries || !err.is_transient() {
                return Err(err);
            }

            let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
            attempt += 1;
            tracing::warn!(
                "{} failed (attempt {}/{}), retrying in {:?}: {}",
                operation,
                attempt,
                self.max_retries + 1,
                delay,
                err
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled { operation }),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> UpstreamError {
        UpstreamError::Status {
            service: "test",
            status: 503,
            body: "busy".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let policy = CallPolicy::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = policy
            .run("op", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = CallPolicy::new(Duration::from_secs(1), 2, Duration::from_millis(1));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = policy
            .run("op", &CancellationToken::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = CallPolicy::new(Duration::from_secs(1), 3, Duration::from_millis(1));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = policy
            .run("op", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::Status {
                    service: "test",
                    status: 401,
                    body: String::new(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let policy = CallPolicy::new(Duration::from_millis(10), 0, Duration::from_millis(1));

        let result: Result<(), _> = policy
            .run("slow call", &CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(UpstreamError::Timeout {
                operation: "slow call",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let policy = CallPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = policy.run("op", &cancel, || async { Ok(()) }).await;

        assert!(matches!(result, Err(UpstreamError::Cancelled { .. })));
    }
}

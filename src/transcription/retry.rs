//! Bounded retry with exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::providers::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Returns the last error on exhaustion.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retry = 0;
        loop {
            match op(retry).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(
                        "Provider call failed ({}), retrying in {}ms ({}/{})",
                        err,
                        delay.as_millis(),
                        retry + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run(|_| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::from_status(429, "rate limited"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::from_status(400, "bad audio"))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Fatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::from_status(503, "down"))
            })
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::Retryable { status: 503, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Transport("connection reset".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

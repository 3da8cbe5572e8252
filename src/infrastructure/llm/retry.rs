//! Exponential backoff retry, grounded on the teacher's
//! `infrastructure/claude/retry.rs`.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::error::LlmError;

pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self { max_retries, initial_backoff_ms, max_backoff_ms }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let should_retry = err.is_transient() && attempt < self.max_retries;
                    if !should_retry {
                        return Err(err);
                    }
                    let backoff = self.calculate_backoff(attempt);
                    warn!(attempt, max_retries = self.max_retries, ?backoff, %err, "retrying LLM call");
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::new(6, 1_000, 8_000);
        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(1_000));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(2_000));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(8_000));
        assert_eq!(policy.calculate_backoff(10), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, 1, 5);
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&call_count);
        let result = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt == 0 {
                        Err(LlmError::RateLimitExceeded)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_a_permanent_error() {
        let policy = RetryPolicy::new(3, 1, 5);
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&call_count);
        let result: Result<(), _> = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::InvalidResponse("bad json".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}

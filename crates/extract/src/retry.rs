use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::llm::{ChatMessage, ChatOptions, LanguageModel, LlmError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Retry transient failures with exponential backoff. Permanent errors
    /// are returned on the first occurrence.
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    let delay = jittered(backoff);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = delay.as_millis(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(delay).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

/// Errors that [`RetryPolicy`] knows how to classify
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Store errors carry no classification, so every one gets the bounded retry.
/// Store writes are idempotent under exact fragment dedup.
impl Retryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// ±10% jitter
fn jittered(base: Duration) -> Duration {
    let factor = 0.9 + rand::random::<f64>() * 0.2;
    base.mul_f64(factor)
}

/// Wraps a model so every call gets its own timeout and the retry policy.
pub struct ResilientModel {
    inner: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl ResilientModel {
    pub fn new(inner: Arc<dyn LanguageModel>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            call_timeout,
        }
    }
}

#[async_trait]
impl LanguageModel for ResilientModel {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, LlmError> {
        let call_timeout = self.call_timeout;
        self.policy
            .retry("llm.chat", move || async move {
                match timeout(call_timeout, self.inner.chat(messages, options)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout(call_timeout)),
                }
            })
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, 1, 2);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = policy
            .retry("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::Transport("connection reset".into()))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(3, 1, 2);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result: Result<(), _> = policy
            .retry("bad-request", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Status { status: 400, body: "nope".into() })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_errors_are_retried() {
        let policy = RetryPolicy::new(2, 1, 2);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = policy
            .retry("store.write", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let model = Arc::new(ScriptedModel::new(|_| Err(LlmError::Transport("down".into()))));
        let resilient = ResilientModel::new(model.clone(), RetryPolicy::new(2, 1, 1), Duration::from_secs(1));

        let result = resilient.chat(&[ChatMessage::user("hi")], &ChatOptions::default()).await;

        assert!(matches!(result, Err(LlmError::Transport(_))));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("late".into())).with_delay(Duration::from_millis(200)));
        let resilient = ResilientModel::new(model, RetryPolicy::none(), Duration::from_millis(10));

        let result = resilient.chat(&[ChatMessage::user("hi")], &ChatOptions::default()).await;

        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }
}

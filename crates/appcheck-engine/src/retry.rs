use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::error::{EngineError, format_err_chain};

/// Constant backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Longest a retried call can run when each attempt is capped at
    /// `per_attempt`.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1) as u32;
        per_attempt * attempts + self.delay * (attempts - 1)
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// Run `operation`, retrying retryable errors under `policy`.
///
/// Logs a warning before every retry.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    f.retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(|err: &EngineError| err.is_retryable())
        .notify(|err: &EngineError, delay: Duration| {
            tracing::warn!(
                operation,
                error = %format_err_chain(err),
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );
        })
        .await
}

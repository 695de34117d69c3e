//! Retry policy and exponential backoff for execute phases.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use reportflow_shared::{ReportFlowError, Result};

/// Abstraction over waiting so tests can observe backoff without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// How a unit's execute phase is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Backoff unit; the wait after failed attempt `n` (0-based) is `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Deadline for a single attempt. Expiry counts as a retryable failure.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait before retrying after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` under `policy`, sleeping between retryable failures.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_backoff_notify(policy, sleeper, |_, _, _| {}, op).await
}

/// [`retry_with_backoff`] with a hook called before each backoff wait.
///
/// The hook receives the 1-based number of the failed attempt, the delay
/// about to be slept and the error. Non-retryable errors and the error from
/// the final attempt are returned without calling it.
pub async fn retry_with_backoff_notify<T, F, Fut, H>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut on_retry: H,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    H: FnMut(u32, Duration, &ReportFlowError),
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        let outcome = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ReportFlowError::Timeout {
                    elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => op(attempt).await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                on_retry(attempt + 1, delay, &err);
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

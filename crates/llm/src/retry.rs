//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::LlmError;

/// Retry settings carried per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt
    pub base_delay_ms: u64,
    /// Fraction of the delay randomized on top (0.0 disables jitter)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            jitter: 0.0,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let jittered = if self.jitter > 0.0 {
            let extra = (base as f64 * self.jitter * rand::rng().random::<f64>()) as u64;
            base + extra
        } else {
            base
        };
        Duration::from_millis(jittered)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts.
/// Only errors whose [`LlmError::is_retryable`] is true are retried.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, ?delay, error = %err, "retryable chat failure, backing off");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| LlmError::InvalidResponse("retry loop exhausted".into())))
}

//! Bounded exponential backoff for rate-limited provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;

/// Retry schedule applied only to [`LlmError::RateLimited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Wait after the first rate-limited attempt; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the attempt following the 1-based `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Sum of all waits when every attempt is rate limited.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_after(a)).sum()
    }
}

/// Why a retried call gave up.
#[derive(Debug)]
pub enum RetryError {
    /// Every attempt was rate limited.
    Exhausted { attempts: u32 },
    /// A non-retryable error; returned on first occurrence.
    Permanent(LlmError),
}

/// Run `op` until it succeeds, fails with a non-rate-limit error, or the
/// attempt budget is spent. No wait follows the final attempt.
pub async fn retry_on_rate_limit<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(LlmError::RateLimited { provider }) => {
                if attempt == max_attempts {
                    break;
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    provider = %provider,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(RetryError::Permanent(e)),
        }
    }

    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Default number of attempts for transient failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(4);

/// Exponential backoff for transient network failures.
///
/// Delay schedule with defaults: 250ms, 500ms, 1s, 2s, 4s (capped).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, Op, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: Op,
) -> Result<T, AppError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    target_url = %what,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

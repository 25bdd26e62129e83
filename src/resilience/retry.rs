//! Retry-with-backoff (spec §4.1 "Retry").

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::ClassifiedFailure;

/// Retry configuration. `base_delay * 2^(attempt-1)`, scaled by a uniform
/// factor in `[1 - jitter_fraction, 1 + jitter_fraction]`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
            jitter_fraction: 0.2,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.base_delay.as_secs_f64() * exp as f64;
        let jitter = self.jitter_fraction.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        Duration::from_secs_f64((base * factor).max(0.0))
    }
}

/// Runs `op` up to `policy.max_attempts` times. Only a retryable
/// [`ClassifiedFailure`] (per [`crate::error::FailureKind::is_retryable`])
/// triggers another attempt; anything else propagates immediately. Each
/// attempt is logged so the Run Trace can surface retry activity via
/// `tracing`'s span/event capture.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, ClassifiedFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifiedFailure>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.retryable && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(op = op_name, attempt, ?delay, kind = ?failure.kind, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

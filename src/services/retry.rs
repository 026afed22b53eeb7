//! Delivery retry policy
//!
//! Bounded exponential backoff around outbound provider calls, used by
//! the webhook adapter. Network errors, 5xx responses and HTTP 429 are
//! retryable; everything else is terminal. Delays are deterministic
//! (initial * factor^attempt, capped).

use std::time::Duration;

use super::channels::DeliveryError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy performing exactly one attempt (retry disabled)
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay slept after the given zero-based attempt fails
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay =
            self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts
    /// are exhausted. Exhaustion converts the last retryable error into a
    /// terminal one carrying its message.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DeliveryError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retryable delivery error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(DeliveryError::Retryable(msg)) => {
                    return Err(DeliveryError::Permanent(format!(
                        "retries exhausted after {} attempts: {}",
                        attempt + 1,
                        msg
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

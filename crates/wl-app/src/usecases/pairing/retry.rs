//! Bounded retry for gateway calls
//!
//! A plain loop instead of recursion: at most `max_attempts` calls, a delay
//! between them, and a cancellation check before every attempt and during
//! every wait.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wl_core::ports::GatewayError;
use wl_core::settings::RetrySettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("operation cancelled")]
    Cancelled,

    /// Last failure after `attempts` calls. Permanent failures stop early.
    #[error("failed after {attempts} attempt(s): {last}")]
    Failed { attempts: u32, last: GatewayError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        let backoff_multiplier =
            if settings.backoff_multiplier.is_finite() && settings.backoff_multiplier >= 1.0 {
                settings.backoff_multiplier
            } else {
                1.0
            };

        Self {
            max_attempts: settings.max_attempts.max(1),
            delay: settings.delay,
            backoff_multiplier,
            max_delay: settings.max_delay.max(settings.delay),
        }
    }

    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires. The closure receives the 1-based attempt
    /// number.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = operation(attempt) => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.max_attempts {
                return Err(RetryError::Failed {
                    attempts: attempt,
                    last: err,
                });
            }

            let wait = self.delay_after(attempt);
            tracing::debug!(
                attempt,
                max_attempts = self.max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "gateway call failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

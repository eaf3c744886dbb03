//! Bounded retry with back-off for transient failures.
//!
//! [`RetryPolicy::run`] wraps any fallible async operation. Only errors that
//! report themselves as [`Transient`] (rate limiting, timeouts, dropped
//! connections) are retried; everything else is returned on the first
//! failure. The same policy type is shared by the signed product API client,
//! the tier-1 page fetcher and the browser driver.

use std::future::Future;
use std::time::Duration;

/// Classifies an error as worth retrying after a delay.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt × step`: 2 s, 4 s, 6 s … with a 2 s step.
    Linear { step: Duration },
    /// `base × 2^(attempt-1)`, never more than `cap`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { step } => step.saturating_mul(attempt),
            Backoff::Exponential { base, cap } => {
                let factor = 1u32 << attempt.saturating_sub(1).min(16);
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

/// Maximum attempts plus a back-off schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    #[must_use]
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, Backoff::Linear { step })
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or `max_attempts` is reached. On exhaustion the last error is returned.
    ///
    /// # Errors
    ///
    /// Returns whatever error the final attempt produced.
    pub async fn run<T, E, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.backoff.delay_after(attempt);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    tracing::warn!(
                        context,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms,
                        error = %err,
                        "transient failure, retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

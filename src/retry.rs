//! Exponential backoff with jitter, shared by the model call and delivery

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, including the first one
    pub max_attempts: u32,

    /// Delay before the second try
    pub base_delay: Duration,

    /// Upper bound for the exponential part of the delay
    pub max_delay: Duration,

    /// Up to this fraction of the delay is added on top at random
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Policy that never waits, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Backoff without jitter after the given failed attempt (1-indexed)
    ///
    /// `min(base * 2^(attempt - 1), max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus `0..=jitter_factor` of itself
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter = backoff.mul_f64(self.jitter_factor.max(0.0) * rand::random::<f64>());
        backoff + jitter
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` tries are used up. The last error is returned.
    pub async fn run<T, E, F, Fut, R>(&self, mut operation: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("succeeded on attempt {attempt}/{max_attempts}");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts && retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "attempt {attempt}/{max_attempts} failed: {e}. retrying in {:.2}s",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if retryable(&e) {
                        warn!("all {max_attempts} attempts exhausted: {e}");
                    } else {
                        debug!("not retrying after attempt {attempt}: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}

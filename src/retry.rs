//! Bounded retry with backoff.
//!
//! Used for VK method calls and for photo downloads. Errors decide for
//! themselves whether another attempt can help through [`Retryable`].

use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No backoff - constant delay between retries
    Constant,
    /// Linear backoff - delay increases linearly with retry attempt
    Linear,
    /// Exponential backoff - delay doubles with each retry attempt
    Exponential,
    /// Exponential backoff with full jitter - random delay between 0 and exponential value
    ExponentialWithJitter,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,
    /// Backoff strategy to use
    pub backoff_strategy: BackoffStrategy,
    /// Upper bound for a single delay in milliseconds
    pub max_delay_ms: u64,
    /// Status codes that should trigger a retry
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            backoff_strategy: BackoffStrategy::ExponentialWithJitter,
            max_delay_ms: 30_000,
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// A configuration that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Checks if an HTTP status code should trigger a retry
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status) || (500..600).contains(&status)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        let millis = match self.backoff_strategy {
            BackoffStrategy::Constant => self.base_delay_ms,
            BackoffStrategy::Linear => self
                .base_delay_ms
                .saturating_mul(u64::from(attempt))
                .min(self.max_delay_ms),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(1 << exponent)
                .min(self.max_delay_ms),
            BackoffStrategy::ExponentialWithJitter => {
                let capped = self
                    .base_delay_ms
                    .saturating_mul(1 << exponent)
                    .min(self.max_delay_ms);
                rand::thread_rng().gen_range(0..=capped)
            }
        };
        Duration::from_millis(millis)
    }
}

/// Errors that know whether a later attempt might succeed
pub trait Retryable {
    fn is_retryable(&self, config: &RetryConfig) -> bool;
}

/// Executes an async operation with retry logic based on configuration
///
/// The operation runs once, then up to `config.max_retries` more times while
/// it keeps failing with a retryable error. The last error is returned.
///
/// # Arguments
///
/// * `label` - Short description used in log messages
/// * `config` - Retry configuration
/// * `operation` - Async operation to execute (as a closure)
pub async fn execute_with_retry<F, Fut, T, E>(
    label: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if attempt < config.max_retries && err.is_retryable(config) => {
                attempt += 1;
                let delay = config.delay_for(attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {}ms",
                    label,
                    err,
                    attempt,
                    config.max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

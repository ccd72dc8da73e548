//! Retry logic with exponential backoff and jitter.
//!
//! Every outbound request goes through [`with_retry`]. A failed attempt is
//! retried only when it is a transport failure (no response), a 5xx, or a
//! 429; the last error is returned unchanged once the budget is spent.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{LotusError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt. Default: 3
    pub max_retries: u32,

    /// Delay before the first retry, and the floor for every retry. Default: 100
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds. Default: 30000
    pub max_delay_ms: u64,

    /// Backoff multiplier. Default: 2.0
    pub backoff_multiplier: f64,

    /// Extra random delay as a fraction of the computed delay. Default: 0.2
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay before retry number `retry` (1-based).
    ///
    /// `base * multiplier^(retry - 1)`, plus up to `jitter_factor` of itself,
    /// capped at `max_delay_ms` and never below `base_delay_ms`. The cap is
    /// applied after jitter so the sequence never decreases.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.max(1.0);
        let exponential =
            self.base_delay_ms as f64 * multiplier.powi(retry.saturating_sub(1) as i32);

        let jitter = exponential * self.jitter_factor.clamp(0.0, 1.0) * rand::random::<f64>();

        let floor = self.base_delay_ms as f64;
        let ceiling = (self.max_delay_ms as f64).max(floor);
        let delay = (exponential + jitter).min(ceiling).max(floor);

        Duration::from_millis(delay as u64)
    }
}

/// Builder for RetryConfig.
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    jitter_factor: Option<f64>,
}

impl RetryConfigBuilder {
    /// Set the retry budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set base delay in milliseconds.
    pub fn base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = Some(delay);
        self
    }

    /// Set maximum delay in milliseconds.
    pub fn max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Set backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Set jitter as a fraction of the delay.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = Some(factor.clamp(0.0, 1.0));
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
            jitter_factor: self.jitter_factor.unwrap_or(defaults.jitter_factor),
        }
    }
}

/// Determine if an error is retryable.
pub fn is_retryable(error: &LotusError) -> bool {
    error.is_retryable()
}

/// Execute an async operation with retry logic.
///
/// # Example
///
/// ```rust,ignore
/// use lotus::http::retry::{with_retry, RetryConfig};
///
/// let config = RetryConfig::default();
/// let result = with_retry(|| async { send_request().await }, &config).await;
/// ```
pub async fn with_retry<T, F, Fut>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_predicate(operation, config, is_retryable).await
}

/// Execute an async operation with retry logic and custom retry predicate.
pub async fn with_retry_predicate<T, F, Fut, P>(
    operation: F,
    config: &RetryConfig,
    should_retry: P,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&LotusError) -> bool,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) || retry >= config.max_retries {
                    return Err(e);
                }

                retry += 1;
                let delay = config.calculate_delay(retry);
                tracing::debug!(
                    code = %e.code,
                    "Retry {} of {} in {:?}",
                    retry,
                    config.max_retries,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

use std::time::Duration;

use crate::error::{ErrorCode, LotusError, Result};
use crate::http::RetryConfig;

pub const DEFAULT_HOST: &str = "https://api.uselotus.io";
pub const DEFAULT_FLUSH_AT: usize = 20;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10_000);
pub const DEFAULT_RETRY_COUNT: u32 = 3;

pub const ENV_API_KEY: &str = "LOTUS_API_KEY";
pub const ENV_HOST: &str = "LOTUS_HOST";
pub const ENV_FLUSH_AT: &str = "LOTUS_FLUSH_AT";
pub const ENV_FLUSH_INTERVAL_MS: &str = "LOTUS_FLUSH_INTERVAL_MS";
pub const ENV_ENABLE: &str = "LOTUS_ENABLE";
pub const ENV_TIMEOUT_MS: &str = "LOTUS_TIMEOUT_MS";
pub const ENV_RETRY_COUNT: &str = "LOTUS_RETRY_COUNT";

/// Strips trailing slashes from a host URL.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct LotusOptions {
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub host: String,
    /// Number of queued events that triggers a flush. Never below 1.
    pub flush_at: usize,
    /// Idle time before queued events are flushed. Zero disables the timer.
    pub flush_interval: Duration,
    /// When false, tracking and flushing are silent no-ops.
    pub enable: bool,
    /// Timeout applied to each individual request attempt.
    pub timeout: Option<Duration>,
    /// Retries allowed after the first attempt.
    pub retry_count: u32,
    pub retry: RetryConfig,
}

impl LotusOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: impl Into<String>) -> LotusOptionsBuilder {
        LotusOptionsBuilder::new(api_key)
    }

    /// Reads options from `LOTUS_*` environment variables.
    ///
    /// Unset variables keep their defaults. Values that fail to parse are
    /// reported as configuration errors rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        let mut builder = Self::builder(api_key);

        if let Ok(host) = std::env::var(ENV_HOST) {
            builder = builder.host(host);
        }
        if let Some(flush_at) = env_parse::<usize>(ENV_FLUSH_AT)? {
            builder = builder.flush_at(flush_at);
        }
        if let Some(ms) = env_parse::<u64>(ENV_FLUSH_INTERVAL_MS)? {
            builder = builder.flush_interval(Duration::from_millis(ms));
        }
        if let Some(enable) = env_parse::<bool>(ENV_ENABLE)? {
            builder = builder.enable(enable);
        }
        if let Some(ms) = env_parse::<u64>(ENV_TIMEOUT_MS)? {
            builder = builder.timeout_ms(ms);
        }
        if let Some(count) = env_parse::<u32>(ENV_RETRY_COUNT)? {
            builder = builder.retry_count(count);
        }

        let options = builder.build();
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(LotusError::missing_api_key());
        }

        let parsed = url::Url::parse(&self.host).map_err(|e| {
            LotusError::with_source(
                ErrorCode::ConfigInvalidHost,
                format!("Invalid host: {}", self.host),
                e,
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LotusError::config_error(
                ErrorCode::ConfigInvalidHost,
                format!("Host must use http or https: {}", self.host),
            ));
        }

        if self.flush_at == 0 {
            return Err(LotusError::config_error(
                ErrorCode::ConfigInvalidValue,
                "flush_at must be at least 1",
            ));
        }

        if matches!(self.timeout, Some(t) if t.is_zero()) {
            return Err(LotusError::config_error(
                ErrorCode::ConfigInvalidValue,
                "Timeout must be positive",
            ));
        }

        Ok(())
    }

    /// Whether the idle flush timer is enabled.
    pub fn timer_enabled(&self) -> bool {
        !self.flush_interval.is_zero()
    }

    /// Retry policy with the configured budget applied.
    pub fn retry_policy(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_count,
            ..self.retry.clone()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map(Some).map_err(|_| {
            LotusError::config_error(
                ErrorCode::ConfigInvalidValue,
                format!("Invalid value for {}: {}", name, raw),
            )
        }),
        _ => Ok(None),
    }
}

pub struct LotusOptionsBuilder {
    api_key: String,
    host: String,
    flush_at: usize,
    flush_interval: Duration,
    enable: bool,
    timeout: Option<Duration>,
    retry_count: u32,
    retry: RetryConfig,
}

impl LotusOptionsBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            flush_at: DEFAULT_FLUSH_AT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            enable: true,
            timeout: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry: RetryConfig::default(),
        }
    }

    pub fn host(mut self, host: impl AsRef<str>) -> Self {
        self.host = normalize_host(host.as_ref());
        self
    }

    /// Sets the batch size. Values below 1 are raised to 1.
    pub fn flush_at(mut self, flush_at: usize) -> Self {
        self.flush_at = flush_at.max(1);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Overrides the backoff curve. The retry budget still comes from `retry_count`.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> LotusOptions {
        LotusOptions {
            api_key: self.api_key,
            host: self.host,
            flush_at: self.flush_at,
            flush_interval: self.flush_interval,
            enable: self.enable,
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry: self.retry,
        }
    }
}

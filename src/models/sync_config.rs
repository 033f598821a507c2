use crate::constants::{
    DEFAULT_LOOKBACK, DEFAULT_REQUEST_DELAY_MS, DEFAULT_STORAGE_TIMEOUT_SECS,
    DEFAULT_UPSERT_CHUNK_SIZE, DEFAULT_UPSTREAM_TIMEOUT_SECS, MARKET_TIMEZONE, SIMPLIZE_BASE_URL,
    VCI_BASE_URL,
};
use crate::error::{AppError, Result};
use crate::models::PriceScale;
use crate::services::retry::{Backoff, RetryPolicy};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upstream market data settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Base URL of the realtime quote API
    pub simplize_base_url: String,
    pub timeout: Duration,
    /// Proxy for upstream requests (http, https or socks5 URL)
    pub proxy: Option<String>,
    /// Rotate browser user agents between requests
    pub random_agent: bool,
    /// Timezone the exchange trades in; trading dates are taken there
    pub timezone: Tz,
    pub price_scale: PriceScale,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: VCI_BASE_URL.to_string(),
            simplize_base_url: SIMPLIZE_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            proxy: None,
            random_agent: true,
            timezone: chrono_tz::Asia::Ho_Chi_Minh,
            price_scale: PriceScale::default(),
        }
    }
}

/// Storage backend settings
#[derive(Clone)]
pub struct StorageConfig {
    pub base_url: String,
    /// Service role key, sent as both `apikey` and bearer token
    pub service_key: String,
    pub timeout: Duration,
    /// Rows per upsert request
    pub chunk_size: usize,
}

// Keeps the service key out of logs and panic messages
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url)
            .field("service_key", &"***")
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// How a run walks its symbol list
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Pause between consecutive symbols
    pub request_delay: Duration,
    pub retry: RetryPolicy,
    /// Bars requested per symbol
    pub lookback: u32,
    /// Check upstream availability once before the list
    pub probe_first: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            retry: RetryPolicy::default(),
            lookback: DEFAULT_LOOKBACK,
            probe_first: false,
        }
    }
}

/// Everything a command needs, assembled once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub driver: DriverConfig,
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{} has invalid value '{}': {}", key, value, e))),
    }
}

impl AppConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; missing optional keys fall back to
    /// defaults, missing required keys are an error
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
        };

        let mut upstream = UpstreamConfig::default();
        if let Some(url) = lookup("VCI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            upstream.base_url = url.trim().to_string();
        }
        if let Some(url) = lookup("SIMPLIZE_BASE_URL").filter(|v| !v.trim().is_empty()) {
            upstream.simplize_base_url = url.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64>("VCI_TIMEOUT_SECS", lookup("VCI_TIMEOUT_SECS"))? {
            upstream.timeout = Duration::from_secs(secs);
        }
        upstream.proxy = lookup("HTTP_PROXY").filter(|v| !v.trim().is_empty());
        if let Some(scale) = lookup("PRICE_SCALE").filter(|v| !v.trim().is_empty()) {
            upstream.price_scale = PriceScale::from_str(&scale).map_err(AppError::Config)?;
        }
        let timezone = lookup("MARKET_TIMEZONE").unwrap_or_else(|| MARKET_TIMEZONE.to_string());
        upstream.timezone = timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| AppError::Config(format!("MARKET_TIMEZONE '{}': {}", timezone, e)))?;

        let storage = StorageConfig {
            base_url: required("SUPABASE_URL")?,
            service_key: required("SUPABASE_SERVICE_KEY")?,
            timeout: Duration::from_secs(
                parse_var("STORAGE_TIMEOUT_SECS", lookup("STORAGE_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS),
            ),
            chunk_size: parse_var("UPSERT_CHUNK_SIZE", lookup("UPSERT_CHUNK_SIZE"))?
                .unwrap_or(DEFAULT_UPSERT_CHUNK_SIZE),
        };

        let mut driver = DriverConfig::default();
        if let Some(ms) = parse_var::<u64>("REQUEST_DELAY_MS", lookup("REQUEST_DELAY_MS"))? {
            driver.request_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>("RETRY_MAX_ATTEMPTS", lookup("RETRY_MAX_ATTEMPTS"))? {
            driver.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>("RETRY_BASE_DELAY_MS", lookup("RETRY_BASE_DELAY_MS"))? {
            if let Backoff::Exponential { base, .. } = &mut driver.retry.backoff {
                *base = Duration::from_millis(ms);
            }
        }

        let config = Self {
            upstream,
            storage,
            driver,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run misbehave, before any request
    pub fn validate(&self) -> Result<()> {
        if self.storage.chunk_size == 0 {
            return Err(AppError::Config("UPSERT_CHUNK_SIZE must be at least 1".to_string()));
        }
        if self.driver.retry.max_attempts == 0 {
            return Err(AppError::Config("RETRY_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.driver.lookback == 0 {
            return Err(AppError::Config("lookback must be at least 1".to_string()));
        }
        for (name, url) in [
            ("SUPABASE_URL", &self.storage.base_url),
            ("VCI_BASE_URL", &self.upstream.base_url),
            ("SIMPLIZE_BASE_URL", &self.upstream.simplize_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        Ok(())
    }
}

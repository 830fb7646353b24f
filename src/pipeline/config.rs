//! Observer configuration from environment variables

use crate::collecting::chain::DEFAULT_PARENT_CAPACITY;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Configuration for the observer runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverConfig {
    /// Base URL of the heavy-storage export service
    pub export_url: String,

    /// SQLite file holding both the projection and the record store
    pub db_path: String,

    /// Cross-batch record cache entries
    pub cache_size: usize,

    /// Parent cache bound of every chain collector
    pub chain_cache_size: usize,

    /// Target pause between pulses when caught up
    pub interval: Duration,

    /// Pause between pulses while behind heavy storage
    pub fast_forward_interval: Duration,

    /// Pause after a failed fetch and between retry attempts
    pub attempt_interval: Duration,

    /// Retry attempts for record fetch and persist
    pub attempts: u32,

    /// HTTP request timeout
    pub request_timeout: Duration,

    pub rust_log: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            export_url: "http://127.0.0.1:5678".to_string(),
            db_path: "observer.db".to_string(),
            cache_size: 10_000,
            chain_cache_size: DEFAULT_PARENT_CAPACITY,
            interval: Duration::from_millis(5_000),
            fast_forward_interval: Duration::from_millis(100),
            attempt_interval: Duration::from_millis(3_000),
            attempts: 60,
            request_timeout: Duration::from_secs(30),
            rust_log: "info".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", name, raw))),
        None => Ok(default),
    }
}

impl ObserverConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `OBSERVER_EXPORT_URL` (default: http://127.0.0.1:5678)
    /// - `OBSERVER_DB_PATH` (default: observer.db)
    /// - `OBSERVER_CACHE_SIZE` (default: 10000)
    /// - `OBSERVER_CHAIN_CACHE_SIZE` (default: 100000)
    /// - `OBSERVER_INTERVAL_MS` (default: 5000)
    /// - `OBSERVER_FAST_FORWARD_INTERVAL_MS` (default: 100)
    /// - `OBSERVER_ATTEMPT_INTERVAL_MS` (default: 3000)
    /// - `OBSERVER_ATTEMPTS` (default: 60)
    /// - `OBSERVER_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `RUST_LOG` (default: info)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let export_url = lookup("OBSERVER_EXPORT_URL").unwrap_or(defaults.export_url);
        if !export_url.starts_with("http://") && !export_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "OBSERVER_EXPORT_URL must start with http:// or https://".to_string(),
            ));
        }

        let db_path = lookup("OBSERVER_DB_PATH").unwrap_or(defaults.db_path);
        if db_path.trim().is_empty() {
            return Err(ConfigError::MissingVariable("OBSERVER_DB_PATH".to_string()));
        }

        let attempts = parse_or(&lookup, "OBSERVER_ATTEMPTS", defaults.attempts)?;
        if attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "OBSERVER_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let millis = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(&lookup, name, default.as_millis() as u64).map(Duration::from_millis)
        };

        Ok(Self {
            export_url,
            db_path,
            cache_size: parse_or(&lookup, "OBSERVER_CACHE_SIZE", defaults.cache_size)?,
            chain_cache_size: parse_or(&lookup, "OBSERVER_CHAIN_CACHE_SIZE", defaults.chain_cache_size)?,
            interval: millis("OBSERVER_INTERVAL_MS", defaults.interval)?,
            fast_forward_interval: millis("OBSERVER_FAST_FORWARD_INTERVAL_MS", defaults.fast_forward_interval)?,
            attempt_interval: millis("OBSERVER_ATTEMPT_INTERVAL_MS", defaults.attempt_interval)?,
            attempts,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "OBSERVER_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

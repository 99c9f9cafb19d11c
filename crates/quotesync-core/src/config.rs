//! Tunables for the sync layer.
//!
//! Sources, last wins: [`SyncConfig::default`], an optional JSON file, then
//! `QUOTESYNC_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;

pub const ENV_PREFIX: &str = "QUOTESYNC_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidEnv { key: String, value: String },
    #[error("config field `{field}` {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

/// All sync tunables, in milliseconds or counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Caller identity charged by the rate limiter.
    pub identity: String,
    pub debounce_ms: u64,
    pub refresh_interval_ms: u64,
    /// Zero disables the cache.
    pub cache_ttl_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub store_timeout_ms: u64,
    pub breaker_open_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity: String::from("local"),
            debounce_ms: 500,
            refresh_interval_ms: 60_000,
            cache_ttl_ms: 60_000,
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            request_timeout_ms: 10_000,
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 5,
            store_timeout_ms: 250,
            breaker_open_timeout_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `QUOTESYNC_<FIELD>` variables; others are ignored.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            let invalid = || ConfigError::InvalidEnv {
                key: key.to_owned(),
                value: value.to_owned(),
            };
            let millis = || value.parse::<u64>().map_err(|_| invalid());
            let count = || value.parse::<u32>().map_err(|_| invalid());

            match field {
                "IDENTITY" => self.identity = value.to_owned(),
                "DEBOUNCE_MS" => self.debounce_ms = millis()?,
                "REFRESH_INTERVAL_MS" => self.refresh_interval_ms = millis()?,
                "CACHE_TTL_MS" => self.cache_ttl_ms = millis()?,
                "MAX_RETRIES" => self.max_retries = count()?,
                "BASE_BACKOFF_MS" => self.base_backoff_ms = millis()?,
                "MAX_BACKOFF_MS" => self.max_backoff_ms = millis()?,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = millis()?,
                "RATE_LIMIT_WINDOW_MS" => self.rate_limit_window_ms = millis()?,
                "RATE_LIMIT_MAX_REQUESTS" => self.rate_limit_max_requests = count()?,
                "STORE_TIMEOUT_MS" => self.store_timeout_ms = millis()?,
                "BREAKER_OPEN_TIMEOUT_MS" => self.breaker_open_timeout_ms = millis()?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.identity.trim().is_empty() {
            return invalid("identity", "must not be empty");
        }
        let positive = [
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("rate_limit_window_ms", self.rate_limit_window_ms),
            ("store_timeout_ms", self.store_timeout_ms),
            ("breaker_open_timeout_ms", self.breaker_open_timeout_ms),
            ("rate_limit_max_requests", u64::from(self.rate_limit_max_requests)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return invalid(field, "must be greater than zero");
            }
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return invalid("max_backoff_ms", "must not be below base_backoff_ms");
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_millis(self.rate_limit_window_ms),
            max_requests: self.rate_limit_max_requests,
        }
    }

    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            open_timeout: Duration::from_millis(self.breaker_open_timeout_ms),
            ..CircuitBreakerConfig::default()
        }
    }
}

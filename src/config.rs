// Configuration for the cache tier, the request queue, retries and the reservation jobs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LodgingConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub reservations: ReservationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // None keeps the façade on the local backend for the whole process lifetime
    pub redis_url: Option<String>,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub default_ttl_secs: u64,
    pub eviction_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            reconnect_max_attempts: 20,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 60_000,
            default_ttl_secs: 300,
            eviction_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub requests_per_second: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
        }
    }
}

impl QueueConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub rate_limit_base_delay_ms: u64,
    pub transient_delay_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_base_delay_ms: 500,
            transient_delay_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    pub pending_expiry_hours: i64,
    pub sweep_interval_secs: u64,
    pub listing_purge_interval_secs: u64,
    pub query_page_size: usize,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            pending_expiry_hours: 24,
            sweep_interval_secs: 3600,
            listing_purge_interval_secs: 86_400,
            query_page_size: 100,
        }
    }
}

impl ReservationConfig {
    pub fn pending_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pending_expiry_hours)
    }
}

impl LodgingConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: LodgingConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    // Loads the file if it exists, then applies environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                debug!("No config file at {}, using defaults", path.display());
                LodgingConfig::default()
            }
            None => LodgingConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("LODGING_REDIS_URL") {
            self.cache.redis_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(rps) = lookup("LODGING_REQUESTS_PER_SECOND") {
            self.queue.requests_per_second = rps.parse().map_err(|_| {
                ConfigError::Invalid(format!("LODGING_REQUESTS_PER_SECOND is not a number: {rps}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.queue.requests_per_second > 0.0) {
            return Err(ConfigError::Invalid(
                "queue.requests_per_second must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.reservations.pending_expiry_hours <= 0 {
            return Err(ConfigError::Invalid(
                "reservations.pending_expiry_hours must be positive".into(),
            ));
        }
        if self.reservations.query_page_size == 0 {
            return Err(ConfigError::Invalid(
                "reservations.query_page_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

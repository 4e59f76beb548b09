use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an empty (or missing) `config.toml` is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub rates: RateSettings,
    pub analytics: AnalyticsSettings,
    pub ingestion: IngestionSettings,
    pub logging: LoggingSettings,
}

/// Connection pool settings. The URL itself comes from `DATABASE_URL`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// How long the latest snapshot is served from the cache before storage is consulted.
    pub snapshot_ttl_secs: u64,
}

impl CacheSettings {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 35,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateSettings {
    /// The currency the feed quotes against. It is never stored as its own ticker row,
    /// so paired-rate queries synthesize it as a constant 1.0 series.
    pub reporting_base: String,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            reporting_base: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Valuation currency used when a request leaves it blank, and the pricing
    /// base assumed when no stored row names one.
    pub default_currency: String,
    /// Deadline applied to every store call made on behalf of one CLI request.
    pub request_timeout_secs: u64,
}

impl AnalyticsSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Endpoint returning `{"base": ..., "result": {ticker: rate}}`.
    pub url: Option<String>,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl IngestionSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            url: None,
            interval_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    AnalyticsSettings, CacheSettings, Config, DatabaseSettings, IngestionSettings,
    LoggingSettings, RateSettings,
};

/// Loads the application configuration.
///
/// Reads `config.toml` from the working directory if it exists, then applies
/// environment overrides such as `INSIGHTS__CACHE__SNAPSHOT_TTL_SECS=10`.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(
            config::Environment::with_prefix("INSIGHTS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    validate(&config)?;

    tracing::debug!(?config, "Configuration loaded.");
    Ok(config)
}

/// Parses configuration from TOML text without touching the filesystem or environment.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    validate(&config)?;
    Ok(config)
}

/// Rejects settings the rest of the system cannot work with.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.rates.reporting_base.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "rates.reporting_base must not be empty".to_string(),
        ));
    }
    if config.analytics.default_currency.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "analytics.default_currency must not be empty".to_string(),
        ));
    }
    if config.ingestion.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ingestion.interval_secs must be greater than zero".to_string(),
        ));
    }
    if config.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.cache.snapshot_ttl_secs, 35);
        assert_eq!(config.rates.reporting_base, "USD");
        assert_eq!(config.ingestion.interval_secs, 30);
        assert!(config.ingestion.url.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [rates]
            reporting_base = "EUR"

            [ingestion]
            url = "https://feed.example/latest"
            interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.rates.reporting_base, "EUR");
        assert_eq!(config.ingestion.url.as_deref(), Some("https://feed.example/latest"));
        assert_eq!(config.ingestion.interval().as_secs(), 60);
        assert_eq!(config.analytics.default_currency, "USD");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = parse_config("[ingestion]\ninterval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}

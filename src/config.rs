//! Configuration loader. Merges env vars, the .env file and config.toml.

use common::config::ServiceConfig;
use common::{Error, GeoPoint};
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &ServiceConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if let Err(e) = config.region.validate() {
        issues.push(format!("region is invalid: {e}"));
    }

    if config.cities.is_empty() {
        issues.push("cities must contain at least one city".into());
    }
    for city in &config.cities {
        if city.id.trim().is_empty() {
            issues.push(format!("city {:?} must have a non-empty id", city.name));
        }
        if GeoPoint::new(city.lat, city.lng).is_err() {
            issues.push(format!(
                "city {} has invalid coordinates ({}, {})",
                city.id, city.lat, city.lng
            ));
        }
    }

    if config.timing.cache_ttl_secs == 0 {
        issues.push("timing.cache_ttl_secs must be > 0".into());
    }
    if config.timing.refresh_interval_secs == 0 {
        issues.push("timing.refresh_interval_secs must be > 0".into());
    }
    if config.timing.request_timeout_secs == 0 {
        issues.push("timing.request_timeout_secs must be > 0".into());
    }
    if config.timing.heartbeat_secs == 0 {
        issues.push("timing.heartbeat_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load service configuration from environment and optional config file.
pub fn load_config() -> Result<ServiceConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = ServiceConfig::default();

    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // Environment wins over the file.
    if let Ok(token) = std::env::var("AQICN_TOKEN") {
        config.aqicn_token = token.trim().to_string();
    }
    if let Ok(raw) = std::env::var("AQI_CACHE_TTL_SECS") {
        config.timing.cache_ttl_secs = parse_positive_u64(&raw, "AQI_CACHE_TTL_SECS")?;
    }
    if let Ok(raw) = std::env::var("AQI_REFRESH_INTERVAL_SECS") {
        config.timing.refresh_interval_secs =
            parse_positive_u64(&raw, "AQI_REFRESH_INTERVAL_SECS")?;
    }
    if let Ok(raw) = std::env::var("AQI_REQUEST_TIMEOUT_SECS") {
        config.timing.request_timeout_secs =
            parse_positive_u64(&raw, "AQI_REQUEST_TIMEOUT_SECS")?;
    }

    if config.aqicn_token.is_empty() {
        return Err(Error::Config(
            "AQICN_TOKEN is required (set in .env or environment)".into(),
        ));
    }

    validate_config(&config)?;

    Ok(config)
}

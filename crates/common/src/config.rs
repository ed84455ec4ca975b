//! Service configuration types.

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

/// Top-level configuration for the station layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// AQICN API token.
    #[serde(default)]
    pub aqicn_token: String,

    /// Region covered by the bulk load.
    #[serde(default)]
    pub region: BoundingBox,

    /// Known locations for the named fan-out load.
    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,
}

/// A known location queried by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    /// Provider feed name (e.g., "Bengaluru").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long an upstream response is reused.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Full bulk refresh interval for the store.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Per-request upstream timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Status log interval.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_cache_ttl() -> u64 {
    300
}
fn default_refresh_interval() -> u64 {
    600
}
fn default_request_timeout() -> u64 {
    8
}
fn default_heartbeat() -> u64 {
    60
}

fn city(id: &str, name: &str, lat: f64, lng: f64) -> CityConfig {
    CityConfig {
        id: id.into(),
        name: name.into(),
        lat,
        lng,
    }
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        city("Amaravati", "Amaravati", 16.5062, 80.6480),
        city("Ahmedabad", "Ahmedabad", 23.0225, 72.5714),
        city("Bengaluru", "Bangalore", 12.9716, 77.5946),
        city("Chennai", "Chennai", 13.0827, 80.2707),
        city("Delhi", "Delhi", 28.6139, 77.2090),
        city("Gurugram", "Gurugram", 28.4595, 77.0266),
        city("Hyderabad", "Hyderabad", 17.3850, 78.4867),
        city("Kolkata", "Kolkata", 22.5726, 88.3639),
        city("Mumbai", "Mumbai", 19.0760, 72.8777),
        city("Pune", "Pune", 18.5204, 73.8567),
        city("Jaipur", "Jaipur", 26.9124, 75.7873),
        city("Lucknow", "Lucknow", 26.8467, 80.9462),
    ]
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_request_timeout(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            aqicn_token: String::new(),
            region: BoundingBox::default(),
            cities: default_cities(),
            timing: TimingConfig::default(),
        }
    }
}

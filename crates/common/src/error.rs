//! Unified error type for the station layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

impl Error {
    /// Whether the next scheduled call (or next cache miss) may succeed.
    ///
    /// Nothing retries inside a single call; this only tells the caller
    /// whether to keep a retry affordance around.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpstreamUnavailable(_) | Error::Provider(_))
    }
}

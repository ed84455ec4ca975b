//! Shared types, config, classification and error definitions for the
//! AQI station layer.

pub mod aqi;
pub mod config;
pub mod error;
pub mod types;

pub use aqi::{classify, AqiCategory};
pub use config::ServiceConfig;
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

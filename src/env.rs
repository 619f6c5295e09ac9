//! Environment variable names used by this crate to resolve a
//! [`ShipperConfig`] from a service's environment.
//!
//! These are read in exactly one place, [`ShipperConfig::from_env`]; the
//! dispatcher itself never touches the environment.
//!
//! [`ShipperConfig`]: crate::config::ShipperConfig
//! [`ShipperConfig::from_env`]: crate::config::ShipperConfig::from_env

/// Bearer token sent with every batch. Required.
pub const LOG_SHIPPER_TOKEN_ENV: &str = "LOG_SHIPPER_TOKEN";

/// Session identifier the batches are grouped under. Required.
pub const LOG_SHIPPER_SESSION_ID_ENV: &str = "LOG_SHIPPER_SESSION_ID";

/// Full ingestion URL, e.g. `https://logs.example.com/api/v1/logs`.
pub const LOG_SHIPPER_ENDPOINT_ENV: &str = "LOG_SHIPPER_ENDPOINT";

/// Alternate base URL; the ingestion path is appended to it.
pub const LOG_SHIPPER_BASE_URL_ENV: &str = "LOG_SHIPPER_BASE_URL";

/// Read an environment variable, treating unset and blank values alike.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `ADMIN_KEY` (required): the out-of-band administrator credential; never persisted
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `EXTERNAL_API_URL` (optional): base URL of the world-ecletix upstream
/// - `NONCE_TTL_MS` (optional): anti-replay nonce lifetime, defaults to 5000
/// - `FLOOD_THRESHOLD` (optional): requests-per-signature flood trigger, defaults to 10
/// - `UPSTREAM_TIMEOUT_MS` (optional): hard cap on the upstream call, defaults to 30000
/// - `SWEEP_INTERVAL_SECS` (optional): maintenance sweep period, defaults to 300
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub admin_key: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_external_api_url")]
    pub external_api_url: String,

    #[serde(default = "default_nonce_ttl_ms")]
    pub nonce_ttl_ms: u64,

    #[serde(default = "default_flood_threshold")]
    pub flood_threshold: u64,

    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_external_api_url() -> String {
    "https://world-ecletix.onrender.com".to_string()
}

fn default_nonce_ttl_ms() -> u64 {
    5000
}

fn default_flood_threshold() -> u64 {
    10
}

fn default_upstream_timeout_ms() -> u64 {
    30_000
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL, ADMIN_KEY)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}

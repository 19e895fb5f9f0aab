//! Runtime configuration for the sync services.

use std::time::Duration;

use loppiskassa_core::sync::{SCAN_SYNC_INTERVAL_SECS, SOLD_ITEMS_SYNC_INTERVAL_SECS};
use loppiskassa_core::Error;

/// Environment variable naming the backend base URL.
pub const API_URL_ENV: &str = "LOPPIS_API_URL";
/// Environment variable carrying the backend access token.
pub const API_TOKEN_ENV: &str = "LOPPIS_API_TOKEN";
/// Optional override for the sold-items sync cadence, in seconds.
pub const SOLD_INTERVAL_ENV: &str = "LOPPIS_SOLD_SYNC_SECS";
/// Optional override for the scan sync cadence, in seconds.
pub const SCAN_INTERVAL_ENV: &str = "LOPPIS_SCAN_SYNC_SECS";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub sold_items_interval: Duration,
    pub scan_interval: Duration,
}

impl SyncConfig {
    pub fn new(api_base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_token: api_token.into(),
            sold_items_interval: Duration::from_secs(SOLD_ITEMS_SYNC_INTERVAL_SECS),
            scan_interval: Duration::from_secs(SCAN_SYNC_INTERVAL_SECS),
        }
    }

    /// Reads the backend URL and token from the environment, with optional
    /// cadence overrides. A non-numeric override is rejected rather than
    /// silently ignored.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = env_value(API_URL_ENV)
            .map(|value| value.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::validation(format!("{API_URL_ENV} is not set")))?;
        let token = env_value(API_TOKEN_ENV)
            .ok_or_else(|| Error::validation(format!("{API_TOKEN_ENV} is not set")))?;

        let mut config = Self::new(base_url, token);
        if let Some(secs) = env_interval(SOLD_INTERVAL_ENV)? {
            config.sold_items_interval = secs;
        }
        if let Some(secs) = env_interval(SCAN_INTERVAL_ENV)? {
            config.scan_interval = secs;
        }
        Ok(config)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_interval(name: &str) -> Result<Option<Duration>, Error> {
    match env_value(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| Error::validation(format!("{name} is not a number of seconds: {raw}"))),
    }
}

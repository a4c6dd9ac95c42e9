//! Configuration for the sync client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default drain cadence while online.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default per-request timeout for the HTTP remote.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// SQLite file backing the local store and queue
    pub database_path: PathBuf,
    /// Base URL of the remote record service
    pub remote_url: String,
    /// Timer-triggered drain period
    pub sync_interval: Duration,
    /// Timeout applied to each remote call
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Configuration with defaults for everything but the remote URL.
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            database_path: PathBuf::from("cask.db"),
            remote_url: remote_url.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let remote_url = lookup("CASK_REMOTE_URL").ok_or(ConfigError::MissingRemoteUrl)?;
        let mut config = Self::new(remote_url);

        if let Some(path) = lookup("CASK_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("CASK_SYNC_INTERVAL_SECS") {
            config.sync_interval = parse_secs("CASK_SYNC_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("CASK_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("CASK_REQUEST_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration {
            key,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CASK_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid {key} value: {value:?} (expected a positive number of seconds)")]
    InvalidDuration { key: &'static str, value: String },
}

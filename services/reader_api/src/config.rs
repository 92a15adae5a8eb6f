//! services/reader_api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Root directory for device-scoped reader settings files.
    pub settings_dir: PathBuf,
    /// Quiet period before a reading position is saved.
    pub progress_save_delay: Duration,
    pub document_fetch_timeout: Duration,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Reader Settings ---
        let settings_dir = lookup("SETTINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./reader_settings"));

        let progress_save_delay =
            Duration::from_millis(parse_number(&lookup, "PROGRESS_SAVE_DELAY_MS", 2000)?);
        let document_fetch_timeout =
            Duration::from_secs(parse_number(&lookup, "DOCUMENT_FETCH_TIMEOUT_SECS", 30)?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            settings_dir,
            progress_save_delay,
            document_fetch_timeout,
            cors_origin,
        })
    }
}

fn parse_number<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/library")]))
                .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.progress_save_delay, Duration::from_secs(2));
        assert_eq!(config.document_fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.settings_dir, PathBuf::from("./reader_settings"));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert_matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::MissingVar(name)) if name == "DATABASE_URL"
        );
    }

    #[test]
    fn invalid_delay_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/library"),
            ("PROGRESS_SAVE_DELAY_MS", "soon"),
        ]));
        assert_matches!(
            result,
            Err(ConfigError::InvalidValue(name, _)) if name == "PROGRESS_SAVE_DELAY_MS"
        );
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/library"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("RUST_LOG", "debug"),
            ("PROGRESS_SAVE_DELAY_MS", "500"),
            ("SETTINGS_DIR", "/var/lib/reader"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.progress_save_delay, Duration::from_millis(500));
        assert_eq!(config.settings_dir, PathBuf::from("/var/lib/reader"));
    }
}

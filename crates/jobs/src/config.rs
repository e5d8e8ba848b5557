//! Sweeper configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SWEEPER_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//!
//! ## Optional
//! - `SWEEPER_SETTINGS` - Where retention settings are read from: `env` or
//!   `database` (default: database)
//! - `SWEEPER_SESSION_INTERVAL_SECS` - Session job interval (default: 300)
//! - `SWEEPER_CUSTOMER_INTERVAL_SECS` - Anonymous customer job interval
//!   (default: 3600)
//! - `SWEEPER_MAX_ITERATIONS` - Passes per drain before giving up until the
//!   next tick (default: 100)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! Retention windows and batch sizes are not configured here. They come from
//! the settings source on every invocation.

use std::num::NonZeroU32;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::scheduler::Schedule;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Where the jobs read their retention settings from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingsBackend {
    /// `SWEEPER_*` environment variables.
    Env,
    /// The `storefront.setting` table.
    #[default]
    Database,
}

impl std::str::FromStr for SettingsBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "database" | "db" => Ok(Self::Database),
            other => Err(format!("expected `env` or `database`, got `{other}`")),
        }
    }
}

/// Sweeper daemon configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Retention settings source
    pub settings: SettingsBackend,
    /// Session job schedule
    pub session_schedule: Schedule,
    /// Anonymous customer job schedule
    pub customer_schedule: Schedule,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
}

impl SweeperConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SWEEPER_DATABASE_URL")?;
        let settings = get_env_or_default("SWEEPER_SETTINGS", "database")
            .parse::<SettingsBackend>()
            .map_err(|e| ConfigError::InvalidEnvVar("SWEEPER_SETTINGS".to_string(), e))?;

        let max_iterations = parse_max_iterations(
            "SWEEPER_MAX_ITERATIONS",
            &get_env_or_default("SWEEPER_MAX_ITERATIONS", "100"),
        )?;
        let session_schedule = Schedule {
            interval: parse_interval(
                "SWEEPER_SESSION_INTERVAL_SECS",
                &get_env_or_default("SWEEPER_SESSION_INTERVAL_SECS", "300"),
            )?,
            max_iterations,
        };
        let customer_schedule = Schedule {
            interval: parse_interval(
                "SWEEPER_CUSTOMER_INTERVAL_SECS",
                &get_env_or_default("SWEEPER_CUSTOMER_INTERVAL_SECS", "3600"),
            )?,
            max_iterations,
        };

        Ok(Self {
            database_url,
            settings,
            session_schedule,
            customer_schedule,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a positive number of seconds.
fn parse_interval(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "interval must be at least one second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_max_iterations(key: &str, raw: &str) -> Result<NonZeroU32, ConfigError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_backend_parse() {
        assert_eq!("env".parse::<SettingsBackend>(), Ok(SettingsBackend::Env));
        assert_eq!(
            " Database ".parse::<SettingsBackend>(),
            Ok(SettingsBackend::Database)
        );
        assert!("yaml".parse::<SettingsBackend>().is_err());
    }

    #[test]
    fn test_parse_interval() {
        let interval = parse_interval("K", "300").unwrap();
        assert_eq!(interval, Duration::from_secs(300));
        assert!(matches!(
            parse_interval("K", "0"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(parse_interval("K", "five").is_err());
    }

    #[test]
    fn test_parse_max_iterations() {
        assert_eq!(parse_max_iterations("K", "100").unwrap().get(), 100);
        assert!(parse_max_iterations("K", "0").is_err());
        assert!(parse_max_iterations("K", "-1").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("SWEEPER_DATABASE_URL".to_string());
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SWEEPER_DATABASE_URL"
        );
    }
}

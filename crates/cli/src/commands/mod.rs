//! Subcommand implementations.

pub mod migrate;
pub mod run;
pub mod settings;
pub mod stats;

use sqlx::PgPool;
use sweeper_jobs::config::{self, ConfigError, SettingsBackend};
use sweeper_jobs::error::ReclaimError;
use sweeper_jobs::settings::{AnySettings, DatabaseSettings, EnvSettings, SettingsError};
use sweeper_jobs::store::{self, RepositoryError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Reclaim(#[from] ReclaimError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Connect to the storefront database named by `SWEEPER_DATABASE_URL`.
async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = config::get_database_url("SWEEPER_DATABASE_URL")?;

    tracing::info!("Connecting to storefront database...");
    Ok(store::create_pool(&database_url).await?)
}

fn settings_source(backend: SettingsBackend, pool: &PgPool) -> AnySettings {
    match backend {
        SettingsBackend::Env => AnySettings::Env(EnvSettings::new()),
        SettingsBackend::Database => AnySettings::Database(DatabaseSettings::new(pool.clone())),
    }
}

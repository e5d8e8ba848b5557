//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! sweeper-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SWEEPER_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Stored in `crates/jobs/migrations/` and embedded in the binary.

use super::{CommandError, connect};

/// Run storefront database migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    sweeper_jobs::MIGRATOR.run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}

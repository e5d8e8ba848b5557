//! Foreground job runs.
//!
//! ```bash
//! # One pass
//! sweeper-cli run sessions
//!
//! # Passes until a batch comes back short (at most 100)
//! sweeper-cli run customers --drain --max-iterations 100
//! ```

use std::num::NonZeroU32;

use sweeper_jobs::config::SettingsBackend;
use sweeper_jobs::jobs::{AnonymousCustomerReclaimer, SessionCleanupJob};
use sweeper_jobs::scheduler;
use sweeper_jobs::store::PgStore;

use super::{CommandError, connect, settings_source};

/// How much work a foreground run does.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Once,
    Drain(NonZeroU32),
}

/// Purge stale sessions and orphaned shoppers.
pub async fn sessions(backend: SettingsBackend, mode: Mode) -> Result<(), CommandError> {
    let pool = connect().await?;
    let job = SessionCleanupJob::new(PgStore::new(pool.clone()), settings_source(backend, &pool));

    match mode {
        Mode::Once => {
            let report = job.purge().await?;
            tracing::info!(
                "Deleted {} sessions and {} orphaned shoppers",
                report.sessions,
                report.shoppers
            );
        }
        Mode::Drain(max_iterations) => {
            let summary = scheduler::drain(&job, max_iterations).await?;
            tracing::info!(
                "Deleted {} sessions in {} passes{}",
                summary.deleted,
                summary.passes,
                cap_note(summary.capped)
            );
        }
    }
    Ok(())
}

/// Reclaim stale anonymous customers.
pub async fn customers(backend: SettingsBackend, mode: Mode) -> Result<(), CommandError> {
    let pool = connect().await?;
    let job = AnonymousCustomerReclaimer::new(
        PgStore::new(pool.clone()),
        settings_source(backend, &pool),
    );

    match mode {
        Mode::Once => {
            let deleted = job.run().await?;
            tracing::info!("Deleted {deleted} anonymous customers");
        }
        Mode::Drain(max_iterations) => {
            let summary = scheduler::drain(&job, max_iterations).await?;
            tracing::info!(
                "Deleted {} anonymous customers in {} passes{}",
                summary.deleted,
                summary.passes,
                cap_note(summary.capped)
            );
        }
    }
    Ok(())
}

const fn cap_note(capped: bool) -> &'static str {
    if capped {
        " (iteration cap reached)"
    } else {
        ""
    }
}

//! Backlog statistics.
//!
//! Counts what each job would consider right now, using the current
//! settings. Nothing is deleted.

use chrono::Utc;
use serde::Serialize;
use sweeper_jobs::config::SettingsBackend;
use sweeper_jobs::settings;
use sweeper_jobs::store::{Backlog, PgStore, ReclaimStore};

use super::{CommandError, connect, settings_source};

#[derive(Debug, Serialize)]
struct StatsReport {
    session_cutoff: chrono::DateTime<Utc>,
    customer_cutoff: chrono::DateTime<Utc>,
    #[serde(flatten)]
    backlog: Backlog,
}

/// Print the reclamation backlog.
pub async fn run(backend: SettingsBackend, json: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let source = settings_source(backend, &pool);

    let session_policy = settings::load_session_policy(&source).await?;
    let customer_policy = settings::load_customer_policy(&source).await?;
    let now = Utc::now();
    let session_cutoff = session_policy.cutoff(now);
    let customer_cutoff = customer_policy.cutoff(now);

    let backlog = PgStore::new(pool)
        .backlog(session_cutoff, customer_cutoff)
        .await?;

    let report = StatsReport {
        session_cutoff,
        customer_cutoff,
        backlog,
    };

    let output = if json {
        serde_json::to_string_pretty(&report)?
    } else {
        format!(
            "stale sessions (before {}):            {}\n\
             reclaimable orphaned shoppers:                  {}\n\
             stale anonymous customers (before {}): {}\n\
             anonymous customers kept by an order:           {}",
            report.session_cutoff.format("%Y-%m-%d"),
            backlog.stale_sessions,
            backlog.reclaimable_shoppers,
            report.customer_cutoff.format("%Y-%m-%d"),
            backlog.stale_anonymous_customers,
            backlog.order_guarded_customers,
        )
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}

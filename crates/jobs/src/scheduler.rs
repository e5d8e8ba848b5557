//! Periodic driver for the reclamation jobs.
//!
//! Each job runs in its own task on its own interval. On every tick the job
//! is drained: passes run back to back until one comes back unsaturated or
//! the iteration cap is hit. A tick that arrives while a drain is still
//! running is delayed, never run concurrently.

use std::num::NonZeroU32;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::jobs::ReclaimJob;

/// How often a job runs and how hard it may work per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub max_iterations: NonZeroU32,
}

/// Totals for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Passes run.
    pub passes: u32,
    /// Primary entities deleted across all passes.
    pub deleted: usize,
    /// The iteration cap stopped the drain while work remained.
    pub capped: bool,
}

/// Run `job` until a pass leaves its batch unfilled, at most
/// `max_iterations` times.
///
/// # Errors
///
/// Returns the first pass error. Passes before it stay committed.
pub async fn drain<J: ReclaimJob>(job: &J, max_iterations: NonZeroU32) -> Result<DrainSummary> {
    let mut summary = DrainSummary::default();

    while summary.passes < max_iterations.get() {
        let outcome = job.run_pass().await?;
        summary.passes += 1;
        summary.deleted += outcome.deleted;

        if !outcome.saturated {
            return Ok(summary);
        }
        debug!(
            job = job.name(),
            pass = summary.passes,
            deleted = outcome.deleted,
            batch_size = outcome.batch_size.get(),
            "Batch full, running another pass"
        );
    }

    summary.capped = true;
    warn!(
        job = job.name(),
        passes = summary.passes,
        deleted = summary.deleted,
        "Iteration cap reached with work remaining"
    );
    Ok(summary)
}

/// Spawn a background task that drains `job` on every tick of `schedule`.
/// Returns a handle that can be used to abort the task.
pub fn spawn_job<J>(job: J, schedule: Schedule) -> JoinHandle<()>
where
    J: ReclaimJob + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(schedule.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            job = job.name(),
            interval_secs = schedule.interval.as_secs(),
            max_iterations = schedule.max_iterations.get(),
            "Job scheduled"
        );

        loop {
            interval.tick().await;
            match drain(&job, schedule.max_iterations).await {
                Ok(summary) if summary.deleted > 0 => info!(
                    job = job.name(),
                    passes = summary.passes,
                    deleted = summary.deleted,
                    "Drain complete"
                ),
                Ok(_) => debug!(job = job.name(), "Nothing to reclaim"),
                Err(e) => e.capture(job.name()),
            }
        }
    })
}

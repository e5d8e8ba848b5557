//! The reclamation jobs.
//!
//! - [`AnonymousCustomerReclaimer`] - whole anonymous identities, customer
//!   granularity
//! - [`SessionCleanupJob`] - stale sessions, then orphaned shoppers
//!
//! Each invocation is one bounded pass: read settings, scan up to a batch of
//! candidates, reclaim each in its own unit of work. A failing candidate is
//! logged and left for a later pass.

pub mod anonymous_customers;
pub mod session_cleanup;

use std::future::Future;
use std::sync::Arc;

use sweeper_core::BatchSize;

pub use anonymous_customers::AnonymousCustomerReclaimer;
pub use session_cleanup::{SessionCleanupJob, SessionPurgeReport};

use crate::error::Result;

/// Summary of one pass, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    /// Primary entities deleted (customers or sessions).
    pub deleted: usize,
    /// The batch size in force for this pass.
    pub batch_size: BatchSize,
    /// Whether some bounded step used its whole batch, so more work may be
    /// waiting.
    pub saturated: bool,
}

/// A job the scheduler can drive.
pub trait ReclaimJob: Send + Sync {
    /// Short name for logs and Sentry.
    fn name(&self) -> &'static str;

    /// Run one bounded pass.
    fn run_pass(&self) -> impl Future<Output = Result<PassOutcome>> + Send;
}

impl<J: ReclaimJob> ReclaimJob for Arc<J> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn run_pass(&self) -> impl Future<Output = Result<PassOutcome>> + Send {
        (**self).run_pass()
    }
}

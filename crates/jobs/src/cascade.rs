//! Cascade executor.
//!
//! Deletes one root and everything it owns inside a single unit of work,
//! following the root type's plan from [`RootKind::plan`]. The candidate's
//! eligibility is re-checked under lock first, so a row that changed since
//! the scan is left alone.

use serde::Serialize;
use sweeper_core::{Candidate, CascadeRoot, EntityKind, RootKind};
use tracing::debug;

use crate::store::{ReclaimStore, Recheck, RepositoryError, UnitOfWork};

/// Rows removed by one committed cascade, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub root: CascadeRoot,
    pub deleted: Vec<(EntityKind, u64)>,
}

impl CascadeReport {
    const fn new(root: CascadeRoot) -> Self {
        Self {
            root,
            deleted: Vec::new(),
        }
    }

    /// Rows of `kind` removed.
    #[must_use]
    pub fn rows(&self, kind: EntityKind) -> u64 {
        self.deleted
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, rows)| rows)
            .sum()
    }

    /// Rows removed across every step.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.deleted.iter().map(|(_, rows)| rows).sum()
    }
}

/// What happened to a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// The root and its dependents were deleted and committed.
    Deleted(CascadeReport),
    /// The root no longer qualifies; nothing was deleted.
    Skipped,
    /// The root was already gone. Counts as success with zero deletions.
    Gone,
}

/// Reclaim one candidate.
///
/// # Errors
///
/// Returns `RepositoryError` if any step fails. The unit of work is dropped
/// without committing, so nothing from this candidate is deleted.
pub async fn execute<S: ReclaimStore>(
    store: &S,
    candidate: Candidate,
) -> Result<CascadeOutcome, RepositoryError> {
    let root = candidate.root();
    let mut unit = store.begin().await?;

    match unit.recheck(candidate).await? {
        Recheck::Eligible => {}
        Recheck::Ineligible => return Ok(CascadeOutcome::Skipped),
        Recheck::Gone => return Ok(CascadeOutcome::Gone),
    }

    let report = run_plan(&mut unit, root, root.kind()).await?;
    if report.rows(root.kind().entity()) == 0 {
        return Ok(CascadeOutcome::Gone);
    }

    unit.commit().await?;

    debug!(
        root = %report.root,
        rows = report.total(),
        steps = ?report.deleted,
        "Cascade committed"
    );
    Ok(CascadeOutcome::Deleted(report))
}

async fn run_plan<U: UnitOfWork>(
    unit: &mut U,
    root: CascadeRoot,
    kind: RootKind,
) -> Result<CascadeReport, RepositoryError> {
    let mut report = CascadeReport::new(root);
    for &step in kind.plan() {
        let rows = unit.delete_owned(step, root).await?;
        report.deleted.push((step, rows));
    }
    Ok(report)
}

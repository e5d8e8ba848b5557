//! Persistence engines for the reclamation jobs.
//!
//! The jobs talk to storage through two traits:
//!
//! - [`ReclaimStore`] - bounded candidate scans and unit-of-work creation
//! - [`UnitOfWork`] - one transaction: re-check a candidate, delete rows,
//!   commit. Dropping a unit without committing rolls it back.
//!
//! # Engines
//!
//! - [`postgres::PgStore`] - the storefront `PostgreSQL` database
//! - [`memory::MemoryStore`] - an in-process engine with the same semantics,
//!   used by the test suites

pub mod memory;
pub mod postgres;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sweeper_core::{
    BatchSize, Candidate, CascadeRoot, Customer, CustomerSession, EntityKind, Shopper,
};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::{PgStore, create_pool};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A deletion step was requested for a root it does not belong to.
    #[error("{kind} cannot be deleted from a {root} cascade")]
    InvalidCascade { kind: EntityKind, root: CascadeRoot },

    /// The storage backend refused or lost the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of re-checking a candidate inside its unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recheck {
    /// Still satisfies the condition it was picked under.
    Eligible,
    /// Exists but no longer qualifies (touched, ordered, regained a session).
    Ineligible,
    /// Already deleted, typically by the other job.
    Gone,
}

/// Sizes of the reclamation queues at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Backlog {
    /// Sessions last accessed before the session cutoff.
    pub stale_sessions: u64,
    /// Orphaned shoppers whose carts are disposable.
    pub reclaimable_shoppers: u64,
    /// Anonymous customers past the customer cutoff with no orders.
    pub stale_anonymous_customers: u64,
    /// Anonymous customers past the cutoff kept alive by an order.
    pub order_guarded_customers: u64,
}

/// Storage operations used by the reclamation jobs.
pub trait ReclaimStore: Send + Sync {
    /// A transaction opened by [`ReclaimStore::begin`].
    type Unit<'a>: UnitOfWork + 'a
    where
        Self: 'a;

    /// Open a unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Unit<'_>, RepositoryError>> + Send;

    /// Anonymous customers last modified strictly before `cutoff` that no
    /// order references, oldest first.
    fn find_stale_anonymous_customers(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> impl Future<Output = Result<Vec<Customer>, RepositoryError>> + Send;

    /// Sessions last accessed strictly before `cutoff`, oldest first.
    fn find_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> impl Future<Output = Result<Vec<CustomerSession>, RepositoryError>> + Send;

    /// Orphaned shoppers whose carts may be discarded, lowest key first.
    fn find_reclaimable_shoppers(
        &self,
        limit: BatchSize,
    ) -> impl Future<Output = Result<Vec<Shopper>, RepositoryError>> + Send;

    /// Count what the jobs would currently consider.
    fn backlog(
        &self,
        session_cutoff: DateTime<Utc>,
        customer_cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Backlog, RepositoryError>> + Send;
}

/// One transaction against the store.
pub trait UnitOfWork: Send {
    /// Lock the candidate's root row and re-evaluate its eligibility.
    fn recheck(
        &mut self,
        candidate: Candidate,
    ) -> impl Future<Output = Result<Recheck, RepositoryError>> + Send;

    /// Delete every row of `kind` owned by `root`. Returns the row count;
    /// zero when nothing was left to delete.
    fn delete_owned(
        &mut self,
        kind: EntityKind,
        root: CascadeRoot,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Make the unit's deletions durable.
    fn commit(self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

//! Sweeper Core - Shared types library.
//!
//! This crate provides common types used across all Sweeper components:
//! - `jobs` - The reclamation jobs, persistence engines and the scheduler daemon
//! - `cli` - Command-line tools for migrations, one-off runs and settings
//! - `integration-tests` - End-to-end reclamation scenarios
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure predicates - no I/O,
//! no database access. The reclamation rules that both persistence engines
//! must agree on live here so they are written once.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, GUIDs and the persisted entity records
//! - [`eligibility`] - Staleness, order-guard and orphan predicates
//! - [`policy`] - Retention settings keys and their validation
//! - [`cascade`] - Ordered deletion plans per cascade root
//! - [`clock`] - Time source abstraction

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cascade;
pub mod clock;
pub mod eligibility;
pub mod policy;
pub mod types;

pub use cascade::{Candidate, CascadeRoot, EntityKind, RootKind};
pub use clock::{Clock, FixedClock, SystemClock};
pub use policy::{
    AnonymousCustomerPolicy, BatchSize, PolicyError, RetentionDays, SessionCleanupPolicy,
    SettingKey,
};
pub use types::*;

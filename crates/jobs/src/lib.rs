//! Sweeper jobs library.
//!
//! Reclaims stale storefront actors: anonymous customers nobody ordered
//! with, sessions nobody has used in weeks, and the shoppers, carts and wish
//! lists those leave behind.
//!
//! # Modules
//!
//! - [`config`] - Daemon configuration from the environment
//! - [`store`] - Persistence traits with `PostgreSQL` and in-memory engines
//! - [`settings`] - Retention settings sources
//! - [`cascade`] - Ordered deletion of one root inside one unit of work
//! - [`jobs`] - The two reclaimers
//! - [`scheduler`] - Periodic drain loop

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cascade;
pub mod config;
pub mod error;
pub mod jobs;
pub mod scheduler;
pub mod settings;
pub mod store;

/// Embedded migrations for the `storefront` schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

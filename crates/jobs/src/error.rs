//! Job-level error type with Sentry integration.
//!
//! Per-candidate failures never surface here: a reclaimer logs them and
//! moves on. A `ReclaimError` means the whole invocation was abandoned.

use thiserror::Error;

use crate::settings::SettingsError;
use crate::store::RepositoryError;

/// Why a job invocation was abandoned.
#[derive(Debug, Error)]
pub enum ReclaimError {
    /// The retention settings could not be read or failed validation.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The candidate scan or the store itself failed.
    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ReclaimError {
    /// Send the error to Sentry and log it with the event id.
    pub fn capture(&self, job: &'static str) {
        let event_id = sentry::capture_error(self);
        tracing::error!(
            job,
            error = %self,
            sentry_event_id = %event_id,
            "Reclamation pass failed"
        );
    }
}

impl ReclaimError {
    /// Send the error to Sentry for a step that failed without abandoning
    /// the invocation.
    pub fn capture_step(&self, job: &'static str, step: &'static str) {
        let event_id = sentry::capture_error(self);
        tracing::warn!(
            job,
            step,
            error = %self,
            sentry_event_id = %event_id,
            "Reclamation step failed, continuing"
        );
    }
}

/// Result type alias for `ReclaimError`.
pub type Result<T> = std::result::Result<T, ReclaimError>;

//! Retention settings sources.
//!
//! A source answers "what is the raw value of this setting right now". The
//! jobs ask at the start of every invocation and never cache the answer, so
//! an operator's change applies to the next pass.
//!
//! # Sources
//!
//! - [`env::EnvSettings`] - `SWEEPER_*` environment variables
//! - [`database::DatabaseSettings`] - the `storefront.setting` table
//! - [`fixed::StaticSettings`] - an in-process map, for tests

pub mod database;
pub mod env;
pub mod fixed;

use std::future::Future;
use std::sync::Arc;

use sweeper_core::{AnonymousCustomerPolicy, PolicyError, SessionCleanupPolicy, SettingKey};
use thiserror::Error;

pub use database::DatabaseSettings;
pub use env::EnvSettings;
pub use fixed::StaticSettings;

/// Errors raised while reading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value is neither a JSON number nor a JSON string.
    #[error("setting {key} holds unsupported value {value}")]
    UnsupportedValue { key: SettingKey, value: String },

    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(&'static str),

    #[error("{0} settings are read-only")]
    ReadOnly(&'static str),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A source of raw retention setting values.
pub trait SettingsSource: Send + Sync {
    /// The raw value of `key`, or `None` when it is not set.
    fn get(
        &self,
        key: SettingKey,
    ) -> impl Future<Output = Result<Option<String>, SettingsError>> + Send;
}

impl<S: SettingsSource> SettingsSource for Arc<S> {
    fn get(
        &self,
        key: SettingKey,
    ) -> impl Future<Output = Result<Option<String>, SettingsError>> + Send {
        (**self).get(key)
    }
}

impl<S: SettingsSource> SettingsSource for &S {
    fn get(
        &self,
        key: SettingKey,
    ) -> impl Future<Output = Result<Option<String>, SettingsError>> + Send {
        (**self).get(key)
    }
}

/// Read and validate the session job's policy.
///
/// # Errors
///
/// Returns `SettingsError` if the source fails or a value is missing or invalid.
pub async fn load_session_policy<S: SettingsSource>(
    source: &S,
) -> Result<SessionCleanupPolicy, SettingsError> {
    let batch_size = source.get(SettingKey::SessionCleanupBatchSize).await?;
    let max_days = source.get(SettingKey::SessionCleanupMaxDaysHistory).await?;
    Ok(SessionCleanupPolicy::from_values(batch_size.as_deref(), max_days.as_deref())?)
}

/// Read and validate the anonymous-customer job's policy.
///
/// # Errors
///
/// Returns `SettingsError` if the source fails or a value is missing or invalid.
pub async fn load_customer_policy<S: SettingsSource>(
    source: &S,
) -> Result<AnonymousCustomerPolicy, SettingsError> {
    let batch_size = source.get(SettingKey::AnonymousCustomerBatchSize).await?;
    let max_days = source
        .get(SettingKey::AnonymousCustomerMaxHistoryDays)
        .await?;
    Ok(AnonymousCustomerPolicy::from_values(batch_size.as_deref(), max_days.as_deref())?)
}

/// The configured source, chosen at startup by `SWEEPER_SETTINGS`.
#[derive(Debug, Clone)]
pub enum AnySettings {
    Env(EnvSettings),
    Database(DatabaseSettings),
}

impl SettingsSource for AnySettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        match self {
            Self::Env(source) => source.get(key).await,
            Self::Database(source) => source.get(key).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_session_policy() {
        let source = StaticSettings::new()
            .with(SettingKey::SessionCleanupBatchSize, "1000")
            .with(SettingKey::SessionCleanupMaxDaysHistory, "20");

        let policy = load_session_policy(&source).await.unwrap();
        assert_eq!(policy.batch_size.get(), 1000);
        assert_eq!(policy.max_days_history.days(), 20);
    }

    #[tokio::test]
    async fn test_missing_value_is_an_error() {
        let source = StaticSettings::new().with(SettingKey::AnonymousCustomerBatchSize, "5");

        let err = load_customer_policy(&source).await.unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Policy(PolicyError::Missing(SettingKey::AnonymousCustomerMaxHistoryDays))
        ));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_an_error() {
        let source = StaticSettings::new()
            .with(SettingKey::SessionCleanupBatchSize, "0")
            .with(SettingKey::SessionCleanupMaxDaysHistory, "20");

        let err = load_session_policy(&source).await.unwrap_err();
        assert!(matches!(err, SettingsError::Policy(PolicyError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_changes_apply_to_next_read() {
        let source = StaticSettings::new()
            .with(SettingKey::SessionCleanupBatchSize, "10")
            .with(SettingKey::SessionCleanupMaxDaysHistory, "20");
        let policy = load_session_policy(&source).await.unwrap();
        assert_eq!(policy.batch_size.get(), 10);

        source.set(SettingKey::SessionCleanupBatchSize, "25");
        let policy = load_session_policy(&source).await.unwrap();
        assert_eq!(policy.batch_size.get(), 25);
    }
}

//! Settings read from environment variables.
//!
//! Each [`SettingKey`] maps to a `SWEEPER_*` variable (see
//! [`SettingKey::env_var`]). Variables are read on every call, not at
//! startup.

use std::sync::Arc;

use sweeper_core::SettingKey;

use super::{SettingsError, SettingsSource};

type Lookup = dyn Fn(&'static str) -> Result<String, std::env::VarError> + Send + Sync;

/// Environment-backed settings.
#[derive(Clone)]
pub struct EnvSettings {
    lookup: Arc<Lookup>,
}

impl std::fmt::Debug for EnvSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSettings").finish_non_exhaustive()
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSettings {
    /// Read from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name))
    }

    /// Read through a custom lookup, e.g. a map in tests.
    #[must_use]
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&'static str) -> Result<String, std::env::VarError> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn read(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        let name = key.env_var();
        match (self.lookup)(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(SettingsError::NotUnicode(name)),
        }
    }
}

impl SettingsSource for EnvSettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        self.read(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn from_map(vars: &[(&'static str, &str)]) -> EnvSettings {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        EnvSettings::with_lookup(move |name| vars.get(name).cloned().ok_or(VarError::NotPresent))
    }

    #[tokio::test]
    async fn test_reads_mapped_variable() {
        let source = from_map(&[("SWEEPER_SESSION_CLEANUP_BATCH_SIZE", "500")]);

        let value = source
            .get(SettingKey::SessionCleanupBatchSize)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("500"));
    }

    #[tokio::test]
    async fn test_unset_variable_is_none() {
        let source = from_map(&[]);

        let value = source
            .get(SettingKey::AnonymousCustomerMaxHistoryDays)
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_non_unicode_is_an_error() {
        let source = EnvSettings::with_lookup(|_| Err(VarError::NotUnicode("\u{fffd}".into())));

        let err = source
            .get(SettingKey::SessionCleanupBatchSize)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::NotUnicode("SWEEPER_SESSION_CLEANUP_BATCH_SIZE")
        ));
    }
}

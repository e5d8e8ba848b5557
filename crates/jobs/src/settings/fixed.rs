//! In-process settings map.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use sweeper_core::SettingKey;

use super::{SettingsError, SettingsSource};

/// Settings held in memory. Clones share the same map, so a value changed
/// through one handle is seen by every job holding another.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: Arc<RwLock<HashMap<SettingKey, String>>>,
}

impl StaticSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::set`].
    #[must_use]
    pub fn with(self, key: SettingKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: SettingKey, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into());
    }

    pub fn remove(&self, key: SettingKey) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }
}

impl SettingsSource for StaticSettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_values() {
        let settings = StaticSettings::new();
        let handle = settings.clone();

        let key = SettingKey::SessionCleanupMaxDaysHistory;
        handle.set(key, "30");
        assert_eq!(settings.get(key).await.unwrap().as_deref(), Some("30"));

        handle.remove(key);
        assert_eq!(settings.get(key).await.unwrap(), None);
    }
}

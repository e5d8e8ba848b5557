//! Settings stored in the `storefront.setting` table.
//!
//! Values are JSONB. A JSON number (`1000`) and a JSON string (`"1000"`)
//! both yield the raw value `1000`; validation happens in the policy layer.

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use sweeper_core::SettingKey;

use super::{SettingsError, SettingsSource};

/// Database-backed settings.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pool: PgPool,
}

impl DatabaseSettings {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a setting value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set(&self, key: SettingKey, value: &JsonValue) -> Result<(), SettingsError> {
        sqlx::query(
            r"
            INSERT INTO storefront.setting (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
            ",
        )
        .bind(key.name())
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl SettingsSource for DatabaseSettings {
    async fn get(&self, key: SettingKey) -> Result<Option<String>, SettingsError> {
        let value: Option<JsonValue> = sqlx::query_scalar(
            r"
            SELECT value FROM storefront.setting
            WHERE key = $1
            ",
        )
        .bind(key.name())
        .fetch_optional(&self.pool)
        .await?;

        value.map(|value| raw_value(key, value)).transpose()
    }
}

/// Flatten a stored JSON value to the raw string the policy layer parses.
fn raw_value(key: SettingKey, value: JsonValue) -> Result<String, SettingsError> {
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(SettingsError::UnsupportedValue {
            key,
            value: other.to_string(),
        }),
    }
}

/// Parse an operator-supplied value into the JSON stored for it.
///
/// Integers are stored as JSON numbers; anything else is stored as a string
/// and rejected by validation on the next read.
#[must_use]
pub fn stored_value(raw: &str) -> JsonValue {
    raw.trim()
        .parse::<i64>()
        .map_or_else(|_| JsonValue::String(raw.to_owned()), JsonValue::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_raw_value_accepts_numbers_and_strings() {
        let key = SettingKey::SessionCleanupBatchSize;
        assert_eq!(raw_value(key, json!(1000)).unwrap(), "1000");
        assert_eq!(raw_value(key, json!("1000")).unwrap(), "1000");
    }

    #[test]
    fn test_raw_value_rejects_structures() {
        let key = SettingKey::SessionCleanupBatchSize;
        assert!(matches!(
            raw_value(key, json!({"size": 10})),
            Err(SettingsError::UnsupportedValue { .. })
        ));
        assert!(raw_value(key, JsonValue::Null).is_err());
    }

    #[test]
    fn test_stored_value() {
        assert_eq!(stored_value("60"), json!(60));
        assert_eq!(stored_value("sixty"), json!("sixty"));
    }
}

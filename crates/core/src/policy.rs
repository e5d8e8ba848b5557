//! Retention settings and their validation.
//!
//! The jobs never cache these values. Every invocation fetches the raw
//! setting strings from a settings source and builds a fresh policy here, so
//! a changed value takes effect on the next invocation.
//!
//! Missing or invalid values are errors, never silently defaulted: an
//! unbounded batch would mean unbounded lock time.

use std::num::NonZeroU32;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised while building a policy from raw setting values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("missing setting: {0}")]
    Missing(SettingKey),
    #[error("invalid value {value:?} for setting {key}: {reason}")]
    Invalid {
        key: SettingKey,
        value: String,
        reason: &'static str,
    },
}

/// Names of the externally supplied retention tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    /// Max sessions deleted per session-job invocation.
    #[serde(rename = "sessionCleanupBatchSize")]
    SessionCleanupBatchSize,
    /// Retention window for sessions, in days since last access.
    #[serde(rename = "sessionCleanupMaxDaysHistory")]
    SessionCleanupMaxDaysHistory,
    /// Retention window for anonymous customers, in days since last modification.
    #[serde(rename = "anonymousCustomerMaxHistoryDays")]
    AnonymousCustomerMaxHistoryDays,
    /// Max customers deleted per customer-job invocation.
    #[serde(rename = "anonymousCustomerBatchSize")]
    AnonymousCustomerBatchSize,
}

impl SettingKey {
    /// Every known key, in display order.
    pub const ALL: [Self; 4] = [
        Self::SessionCleanupBatchSize,
        Self::SessionCleanupMaxDaysHistory,
        Self::AnonymousCustomerMaxHistoryDays,
        Self::AnonymousCustomerBatchSize,
    ];

    /// The setting's name in settings storage.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SessionCleanupBatchSize => "sessionCleanupBatchSize",
            Self::SessionCleanupMaxDaysHistory => "sessionCleanupMaxDaysHistory",
            Self::AnonymousCustomerMaxHistoryDays => "anonymousCustomerMaxHistoryDays",
            Self::AnonymousCustomerBatchSize => "anonymousCustomerBatchSize",
        }
    }

    /// The environment variable the setting is read from.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::SessionCleanupBatchSize => "SWEEPER_SESSION_CLEANUP_BATCH_SIZE",
            Self::SessionCleanupMaxDaysHistory => "SWEEPER_SESSION_CLEANUP_MAX_DAYS_HISTORY",
            Self::AnonymousCustomerMaxHistoryDays => "SWEEPER_ANONYMOUS_CUSTOMER_MAX_HISTORY_DAYS",
            Self::AnonymousCustomerBatchSize => "SWEEPER_ANONYMOUS_CUSTOMER_BATCH_SIZE",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| format!("unknown setting: {s}"))
    }
}

/// Maximum number of primary entities deleted by one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchSize(NonZeroU32);

impl BatchSize {
    /// Create a batch size.
    #[must_use]
    pub const fn new(size: NonZeroU32) -> Self {
        Self(size)
    }

    /// Parse a batch size from a raw setting value.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Invalid` unless the value is a positive integer.
    pub fn parse(key: SettingKey, raw: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::Invalid {
            key,
            value: raw.to_owned(),
            reason,
        };
        let value: i64 = raw.trim().parse().map_err(|_| invalid("not an integer"))?;
        let value = u32::try_from(value).map_err(|_| invalid("must be between 1 and 4294967295"))?;
        NonZeroU32::new(value)
            .map(Self)
            .ok_or_else(|| invalid("must be greater than zero"))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The batch size as a collection length.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

/// A retention window in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionDays(u32);

impl RetentionDays {
    /// Longest accepted window (a century).
    pub const MAX: u32 = 36_500;

    /// Parse a retention window from a raw setting value.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Invalid` unless the value is an integer between
    /// 1 and [`Self::MAX`]. A zero-day window would make every live session
    /// stale.
    pub fn parse(key: SettingKey, raw: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::Invalid {
            key,
            value: raw.to_owned(),
            reason,
        };
        let days: i64 = raw.trim().parse().map_err(|_| invalid("not an integer"))?;
        if days < 1 {
            return Err(invalid("must be at least one day"));
        }
        u32::try_from(days)
            .ok()
            .filter(|days| *days <= Self::MAX)
            .map(Self)
            .ok_or_else(|| invalid("must be at most 36500 days"))
    }

    #[must_use]
    pub const fn days(self) -> u32 {
        self.0
    }

    /// The cutoff instant: rows strictly older than this are stale.
    #[must_use]
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.0))
    }
}

fn required<'a>(key: SettingKey, raw: Option<&'a str>) -> Result<&'a str, PolicyError> {
    raw.filter(|value| !value.trim().is_empty())
        .ok_or(PolicyError::Missing(key))
}

/// Policy for one session-job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCleanupPolicy {
    pub batch_size: BatchSize,
    pub max_days_history: RetentionDays,
}

impl SessionCleanupPolicy {
    /// Build the policy from raw `sessionCleanupBatchSize` and
    /// `sessionCleanupMaxDaysHistory` values.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` if either value is missing or invalid.
    pub fn from_values(
        batch_size: Option<&str>,
        max_days_history: Option<&str>,
    ) -> Result<Self, PolicyError> {
        let batch_key = SettingKey::SessionCleanupBatchSize;
        let days_key = SettingKey::SessionCleanupMaxDaysHistory;
        Ok(Self {
            batch_size: BatchSize::parse(batch_key, required(batch_key, batch_size)?)?,
            max_days_history: RetentionDays::parse(
                days_key,
                required(days_key, max_days_history)?,
            )?,
        })
    }

    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.max_days_history.cutoff(now)
    }
}

/// Policy for one anonymous-customer-job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnonymousCustomerPolicy {
    pub batch_size: BatchSize,
    pub max_history_days: RetentionDays,
}

impl AnonymousCustomerPolicy {
    /// Build the policy from raw `anonymousCustomerBatchSize` and
    /// `anonymousCustomerMaxHistoryDays` values.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` if either value is missing or invalid.
    pub fn from_values(
        batch_size: Option<&str>,
        max_history_days: Option<&str>,
    ) -> Result<Self, PolicyError> {
        let batch_key = SettingKey::AnonymousCustomerBatchSize;
        let days_key = SettingKey::AnonymousCustomerMaxHistoryDays;
        Ok(Self {
            batch_size: BatchSize::parse(batch_key, required(batch_key, batch_size)?)?,
            max_history_days: RetentionDays::parse(
                days_key,
                required(days_key, max_history_days)?,
            )?,
        })
    }

    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.max_history_days.cutoff(now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_key_names_roundtrip() {
        for key in SettingKey::ALL {
            assert_eq!(key.name().parse::<SettingKey>(), Ok(key));
        }
        assert!("batchSize".parse::<SettingKey>().is_err());
    }

    #[test]
    fn test_setting_key_serde_uses_name() {
        let json = serde_json::to_string(&SettingKey::SessionCleanupBatchSize).unwrap();
        assert_eq!(json, "\"sessionCleanupBatchSize\"");
    }

    #[test]
    fn test_batch_size_parse() {
        let key = SettingKey::SessionCleanupBatchSize;
        assert_eq!(BatchSize::parse(key, "1000").unwrap().get(), 1000);
        assert_eq!(BatchSize::parse(key, " 10 ").unwrap().as_usize(), 10);
        assert!(matches!(
            BatchSize::parse(key, "0"),
            Err(PolicyError::Invalid { .. })
        ));
        assert!(BatchSize::parse(key, "-5").is_err());
        assert!(BatchSize::parse(key, "ten").is_err());
        assert!(BatchSize::parse(key, "99999999999").is_err());
    }

    #[test]
    fn test_retention_days_parse() {
        let key = SettingKey::SessionCleanupMaxDaysHistory;
        assert_eq!(RetentionDays::parse(key, "20").unwrap().days(), 20);
        assert!(RetentionDays::parse(key, "0").is_err());
        assert!(RetentionDays::parse(key, "36501").is_err());
        assert!(RetentionDays::parse(key, "1.5").is_err());
    }

    #[test]
    fn test_cutoff_subtracts_days() {
        let now = Utc::now();
        let days = RetentionDays::parse(SettingKey::SessionCleanupMaxDaysHistory, "20").unwrap();
        assert_eq!(now - days.cutoff(now), Duration::days(20));
    }

    #[test]
    fn test_session_policy_missing_values_are_fatal() {
        assert_eq!(
            SessionCleanupPolicy::from_values(None, Some("20")),
            Err(PolicyError::Missing(SettingKey::SessionCleanupBatchSize))
        );
        assert_eq!(
            SessionCleanupPolicy::from_values(Some("10"), Some("  ")),
            Err(PolicyError::Missing(SettingKey::SessionCleanupMaxDaysHistory))
        );
    }

    #[test]
    fn test_customer_policy_from_values() {
        let policy = AnonymousCustomerPolicy::from_values(Some("5"), Some("60")).unwrap();
        assert_eq!(policy.batch_size.get(), 5);
        assert_eq!(policy.max_history_days.days(), 60);
    }
}

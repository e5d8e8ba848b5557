//! Retention settings commands.
//!
//! ```bash
//! sweeper-cli settings show
//! sweeper-cli settings set anonymousCustomerMaxHistoryDays 90
//! ```
//!
//! Only the database source can be written. Environment settings are
//! changed by redeploying with new `SWEEPER_*` variables.

use sweeper_core::{BatchSize, RetentionDays, SettingKey};
use sweeper_jobs::config::SettingsBackend;
use sweeper_jobs::settings::{DatabaseSettings, SettingsError, SettingsSource, database};

use super::{CommandError, connect, settings_source};

/// Validate a raw value the way the jobs will when they read it.
fn validate(key: SettingKey, raw: &str) -> Result<(), sweeper_core::PolicyError> {
    match key {
        SettingKey::SessionCleanupBatchSize | SettingKey::AnonymousCustomerBatchSize => {
            BatchSize::parse(key, raw).map(|_| ())
        }
        SettingKey::SessionCleanupMaxDaysHistory | SettingKey::AnonymousCustomerMaxHistoryDays => {
            RetentionDays::parse(key, raw).map(|_| ())
        }
    }
}

/// Print every setting with its current value.
pub async fn show(backend: SettingsBackend) -> Result<(), CommandError> {
    let pool = connect().await?;
    let source = settings_source(backend, &pool);

    for key in SettingKey::ALL {
        let name = key.name();
        let line = match source.get(key).await? {
            None => format!("{name:<34} <unset>"),
            Some(raw) => match validate(key, &raw) {
                Ok(()) => format!("{name:<34} {raw}"),
                Err(e) => format!("{name:<34} {raw}  (invalid: {e})"),
            },
        };
        #[allow(clippy::print_stdout)]
        {
            println!("{line}");
        }
    }
    Ok(())
}

/// Store a validated setting value in the database.
pub async fn set(
    backend: SettingsBackend,
    key: SettingKey,
    value: &str,
) -> Result<(), CommandError> {
    if backend == SettingsBackend::Env {
        return Err(SettingsError::ReadOnly("environment").into());
    }
    validate(key, value).map_err(SettingsError::from)?;

    let pool = connect().await?;
    DatabaseSettings::new(pool)
        .set(key, &database::stored_value(value))
        .await?;

    tracing::info!("Setting {key} updated to {value}");
    Ok(())
}

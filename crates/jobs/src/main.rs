//! Sweeper daemon - Scheduled reclamation of stale storefront actors.
//!
//! Runs two jobs against the storefront database, each on its own interval:
//!
//! - Session cleanup: stale sessions, then orphaned shoppers
//! - Anonymous customer reclamation: stale, order-free anonymous identities
//!
//! Migrations are NOT run on startup. Run them explicitly via:
//! `cargo run -p sweeper-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use sentry::integrations::tracing as sentry_tracing;
use sweeper_jobs::config::{SettingsBackend, SweeperConfig};
use sweeper_jobs::jobs::{AnonymousCustomerReclaimer, SessionCleanupJob};
use sweeper_jobs::scheduler;
use sweeper_jobs::settings::{AnySettings, DatabaseSettings, EnvSettings};
use sweeper_jobs::store::{self, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SweeperConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = SweeperConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sweeper_jobs=info,sweeper=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = store::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let settings = match config.settings {
        SettingsBackend::Env => AnySettings::Env(EnvSettings::new()),
        SettingsBackend::Database => AnySettings::Database(DatabaseSettings::new(pool.clone())),
    };
    tracing::info!(source = ?config.settings, "Retention settings source selected");

    let store = PgStore::new(pool);
    let sessions = scheduler::spawn_job(
        SessionCleanupJob::new(store.clone(), settings.clone()),
        config.session_schedule,
    );
    let customers = scheduler::spawn_job(
        AnonymousCustomerReclaimer::new(store, settings),
        config.customer_schedule,
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    sessions.abort();
    customers.abort();
}

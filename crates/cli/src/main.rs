//! Sweeper CLI - Migrations, one-off runs and retention settings.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! sweeper-cli migrate
//!
//! # Run one session cleanup pass
//! sweeper-cli run sessions
//!
//! # Drain the anonymous customer backlog
//! sweeper-cli run customers --drain
//!
//! # Inspect and change retention settings
//! sweeper-cli settings show
//! sweeper-cli settings set sessionCleanupMaxDaysHistory 30
//!
//! # Count what the jobs would currently reclaim
//! sweeper-cli stats
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `run` - Run a job pass (or a full drain) in the foreground
//! - `settings` - Show or update retention settings
//! - `stats` - Print the reclamation backlog

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::num::NonZeroU32;

use clap::{Parser, Subcommand, ValueEnum};
use sweeper_core::SettingKey;
use sweeper_jobs::config::SettingsBackend;

mod commands;

#[derive(Parser)]
#[command(name = "sweeper-cli")]
#[command(author, version, about = "Sweeper CLI tools")]
struct Cli {
    /// Where retention settings are read from (`env` or `database`)
    #[arg(long, global = true, env = "SWEEPER_SETTINGS", default_value = "database")]
    settings: SettingsBackend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run a reclamation job in the foreground
    Run {
        /// Which job to run
        #[arg(value_enum)]
        job: JobTarget,

        /// Keep running passes until a batch comes back short
        #[arg(long)]
        drain: bool,

        /// Maximum passes when draining
        #[arg(long, default_value = "100")]
        max_iterations: NonZeroU32,
    },
    /// Show or update retention settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the reclamation backlog
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum JobTarget {
    /// Stale sessions and orphaned shoppers
    Sessions,
    /// Stale anonymous customers
    Customers,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every retention setting and whether it is valid
    Show,
    /// Store a setting in the database
    Set {
        /// Setting name (e.g. `sessionCleanupBatchSize`)
        key: SettingKey,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Run {
            job,
            drain,
            max_iterations,
        } => {
            let mode = if drain {
                commands::run::Mode::Drain(max_iterations)
            } else {
                commands::run::Mode::Once
            };
            match job {
                JobTarget::Sessions => commands::run::sessions(cli.settings, mode).await?,
                JobTarget::Customers => commands::run::customers(cli.settings, mode).await?,
            }
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => commands::settings::show(cli.settings).await?,
            SettingsAction::Set { key, value } => {
                commands::settings::set(cli.settings, key, &value).await?;
            }
        },
        Commands::Stats { json } => commands::stats::run(cli.settings, json).await?,
    }
    Ok(())
}

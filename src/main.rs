//! Hourly ad-budget optimization bot.
//!
//! One invocation runs one optimization cycle across all configured
//! advertisers; the hourly cadence comes from the scheduler (cron)
//! that invokes it. Overlapping triggers are absorbed by the job lock.

mod bot;
mod config;
mod lock;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use bot::Orchestrator;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "ad-budget-bot", about = "Hourly ad-budget optimization")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Evaluate and snapshot, but skip all platform mutations.
    #[arg(long)]
    dry_run: bool,

    /// Run only this advertiser id.
    #[arg(long)]
    advertiser: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(ref id) = cli.advertiser {
        config.advertisers.retain(|a| &a.id == id);
        if config.advertisers.is_empty() {
            anyhow::bail!("no advertiser with id '{}' in config", id);
        }
    }
    info!(
        "loaded config: {} advertisers, {} channels",
        config.advertisers.len(),
        config.channels.len()
    );

    let orchestrator = Orchestrator::new(config)?;
    orchestrator.run_all(cli.dry_run).await?;
    Ok(())
}

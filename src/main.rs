use anyhow::Result;
use clap::{Parser, Subcommand};
use chrono::Utc;
use clickhouse::Client;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::db::init::init_database;
use crate::services::history_run::run_history;
use crate::services::inputs::build_limiter;
use crate::services::metrics_run::run_owner_metrics;
use crate::services::scheduler::start_scheduler;
use crate::services::tdh_run::run_tdh;

mod config;
mod db;
mod services;
mod types;

#[derive(Parser, Debug)]
#[command(name = "tdh-engine", version, about = "TDH snapshots, owner metrics and history")]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Compute today's TDH snapshot, then its history
    Tdh,
    /// Recompute owner metrics
    OwnerMetrics,
    /// Diff the latest snapshot against the previous day
    History,
    /// Run both cycles on their intervals (default)
    Schedule,
}

async fn connect_to_clickhouse(settings: &Settings) -> Result<Client> {
    let max_retries = settings.clickhouse_connect_retries.max(1);
    let client = Client::default()
        .with_url(&settings.clickhouse_url)
        .with_database(&settings.clickhouse_database);

    let mut attempt = 1;
    loop {
        match client.query("SELECT 1").execute().await {
            Ok(_) => {
                tracing::info!("Connected to ClickHouse at {}", settings.clickhouse_url);
                return Ok(client);
            }
            Err(e) if attempt < max_retries => {
                tracing::warn!("Failed to connect to ClickHouse (attempt {}/{}): {}", attempt, max_retries, e);
                sleep(Duration::from_secs(2)).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Failed to connect to ClickHouse after {} attempts: {}", max_retries, e));
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mode = Cli::parse().mode.unwrap_or(Mode::Schedule);
    let settings = Arc::new(Settings::from_env());
    for warning in settings.warnings() {
        tracing::warn!("{}", warning);
    }
    let limiter = build_limiter(&settings);

    // Connect to ClickHouse with retries
    let client = connect_to_clickhouse(&settings).await?;

    // Initialize database tables
    init_database(&client).await?;

    tracing::info!("Running in {:?} mode", mode);
    match mode {
        Mode::Tdh => {
            run_tdh(&client, &settings, &limiter, Utc::now()).await?;
            run_history(&client, &settings).await?;
        }
        Mode::OwnerMetrics => run_owner_metrics(&client, &settings, &limiter, Utc::now()).await?,
        Mode::History => {
            run_history(&client, &settings).await?;
        }
        Mode::Schedule => {
            let scheduler_handle = tokio::spawn(start_scheduler(client.clone(), settings.clone(), limiter.clone()));

            tokio::select! {
                result = scheduler_handle => {
                    if let Err(e) = result {
                        tracing::error!("Scheduler stopped: {:?}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}

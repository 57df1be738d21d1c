use chrono::Utc;
use clickhouse::Client;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Settings;
use crate::services::history_run::run_history;
use crate::services::inputs::FetchLimiter;
use crate::services::metrics_run::run_owner_metrics;
use crate::services::tdh_run::run_tdh;

/// Runs the daily TDH cycle (snapshot, then history) and the more frequent
/// owner metrics cycle forever. A failed cycle is tried again after
/// `retry_max` instead of waiting for its next regular tick.
pub async fn start_scheduler(client: Client, settings: Arc<Settings>, limiter: Arc<FetchLimiter>) {
    tracing::info!(
        "Starting scheduler: TDH every {:?}, owner metrics every {:?}",
        settings.tdh_interval,
        settings.owner_metrics_interval
    );
    let mut tdh_timer = tokio::time::interval(settings.tdh_interval);
    let mut metrics_timer = tokio::time::interval(settings.owner_metrics_interval);
    tdh_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    metrics_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tdh_timer.tick() => {
                tracing::info!("Starting TDH cycle...");
                let outcome = match run_tdh(&client, &settings, &limiter, Utc::now()).await {
                    Ok(_) => run_history(&client, &settings).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                if let Err(e) = outcome {
                    tracing::error!("TDH cycle failed: {:?}", e);
                    tdh_timer.reset_at(Instant::now() + settings.retry_max);
                }
            }

            _ = metrics_timer.tick() => {
                tracing::info!("Starting owner metrics cycle...");
                if let Err(e) = run_owner_metrics(&client, &settings, &limiter, Utc::now()).await {
                    tracing::error!("Owner metrics cycle failed: {:?}", e);
                    metrics_timer.reset_at(Instant::now() + settings.retry_max);
                }
            }
        }
    }
}

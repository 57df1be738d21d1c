use chrono::NaiveDate;
use clickhouse::Client;
use std::time::Instant;

use crate::config::Settings;
use crate::db::operations::replace_history;
use crate::db::queries::{get_latest_snapshot_date, get_tdh_snapshot};
use crate::db::schema::TDH_TABLE;
use crate::services::history::{diff_snapshots, global_rollup};
use crate::services::retry::{with_backoff, RetryPolicy};
use crate::services::tdh_run::snapshot_instant;

/// Diffs the latest stored consolidated snapshot against the one from the
/// day before and stores the deltas. Returns the diffed date, if any.
pub async fn run_history(client: &Client, settings: &Settings) -> anyhow::Result<Option<NaiveDate>> {
    let started = Instant::now();
    let policy = RetryPolicy::from(settings);

    let Some(today) =
        with_backoff("latest snapshot", policy, || get_latest_snapshot_date(client))
            .await?
    else {
        tracing::warn!("No TDH snapshot stored yet, skipping history");
        return Ok(None);
    };
    let Some(yesterday) = today.pred_opt() else {
        return Ok(None);
    };

    let (current, previous) = tokio::try_join!(
        with_backoff("today's snapshot", policy, || get_tdh_snapshot(client, TDH_TABLE, today)),
        with_backoff("yesterday's snapshot", policy, || {
            get_tdh_snapshot(client, TDH_TABLE, yesterday)
        }),
    )?;
    if previous.is_empty() {
        tracing::warn!(
            "No snapshot for {}, every row of {} counts as created",
            yesterday,
            today
        );
    }

    let date = current
        .first()
        .map(|r| r.date)
        .unwrap_or_else(|| snapshot_instant(chrono::Utc::now()));
    let block = current.iter().map(|r| r.block).max().unwrap_or(0);

    let history = diff_snapshots(&current, &previous, date, block);
    let global = global_rollup(&history, &current, date, block);
    replace_history(client, today, &history, &global).await?;

    tracing::info!(
        "History for {} finished in {:?}: {} rows, net tdh {:.2}, net boosted tdh {:.2}",
        today,
        started.elapsed(),
        history.len(),
        global.deltas.net_tdh,
        global.deltas.net_boosted_tdh
    );
    Ok(Some(today))
}

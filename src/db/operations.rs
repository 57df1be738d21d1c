use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clickhouse::{Client, Row};
use serde::Serialize;

use crate::db::models::{
    from_offset, to_offset, GlobalTdhHistoryRow, OwnerMetricRow, TdhHistoryRow, TdhRow, TdhRunRow,
};
use crate::db::schema::{
    TDH_GLOBAL_HISTORY_TABLE, TDH_HISTORY_TABLE, TDH_RUNS_TABLE, TDH_TABLE, TDH_WALLET_TABLE,
};
use crate::types::error::TdhError;
use crate::types::models::{
    GlobalTdhHistoryRecord, OwnerMetricRecord, TdhHistoryRecord, TdhRecord,
};

async fn insert_rows<T: Row + Serialize>(client: &Client, table: &str, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut inserter = client.insert(table)?;
    for row in rows {
        inserter.write(row).await?;
    }
    inserter.end().await?;
    tracing::info!("Stored {} rows in {}", rows.len(), table);
    Ok(())
}

/// Drops whatever an earlier run wrote for `date`, so a re-run replaces the
/// whole day instead of leaving rows of groups that no longer exist.
async fn clear_date(client: &Client, table: &str, date: NaiveDate) -> Result<()> {
    client
        .query(&format!(
            "ALTER TABLE {} DELETE WHERE toDate(date) = toDate(?)",
            table
        ))
        .bind(date.format("%Y-%m-%d").to_string())
        .execute()
        .await?;
    Ok(())
}

/// Both snapshot tables of one run, tagged with its `run_id`, plus the
/// commit row that makes them visible.
#[derive(Debug)]
pub struct PreparedSnapshot {
    pub consolidated: Vec<TdhRow>,
    pub wallets: Vec<TdhRow>,
    pub commit: TdhRunRow,
}

fn tagged_rows(records: &[TdhRecord], run_id: u64) -> Result<Vec<TdhRow>, TdhError> {
    records
        .iter()
        .map(|r| {
            let mut row = TdhRow::try_from(r)?;
            row.run_id = run_id;
            Ok(row)
        })
        .collect()
}

/// Converts every record before anything is written, so a bad record fails
/// the run with nothing stored.
pub fn prepare_snapshot(
    date: DateTime<Utc>,
    run_id: u64,
    block: u64,
    consolidated: &[TdhRecord],
    wallets: &[TdhRecord],
) -> Result<PreparedSnapshot, TdhError> {
    Ok(PreparedSnapshot {
        consolidated: tagged_rows(consolidated, run_id)?,
        wallets: tagged_rows(wallets, run_id)?,
        commit: TdhRunRow {
            date: to_offset(date),
            run_id,
            block,
            consolidations: consolidated.len() as u64,
            wallets: wallets.len() as u64,
        },
    })
}

async fn clear_superseded(client: &Client, table: &str, date: NaiveDate, run_id: u64) -> Result<()> {
    client
        .query(&format!(
            "ALTER TABLE {} DELETE WHERE toDate(date) = toDate(?) AND run_id != ?",
            table
        ))
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(run_id)
        .execute()
        .await?;
    Ok(())
}

/// Writes both tables, then the commit row. Readers only see committed runs,
/// so a failure before the commit leaves the previous snapshot in place.
/// Older runs of the same day are cleared afterwards.
pub async fn store_tdh_snapshot(client: &Client, snapshot: &PreparedSnapshot) -> Result<()> {
    insert_rows(client, TDH_TABLE, &snapshot.consolidated).await?;
    insert_rows(client, TDH_WALLET_TABLE, &snapshot.wallets).await?;
    insert_rows(client, TDH_RUNS_TABLE, std::slice::from_ref(&snapshot.commit)).await?;

    let date = from_offset(snapshot.commit.date).date_naive();
    for table in [TDH_TABLE, TDH_WALLET_TABLE, TDH_RUNS_TABLE] {
        if let Err(e) = clear_superseded(client, table, date, snapshot.commit.run_id).await {
            tracing::warn!("Could not clear superseded runs of {} from {}: {}", date, table, e);
        }
    }
    Ok(())
}

pub async fn upsert_owner_metrics(
    client: &Client,
    table: &str,
    records: &[OwnerMetricRecord],
) -> Result<()> {
    let rows = records
        .iter()
        .map(OwnerMetricRow::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    insert_rows(client, table, &rows).await
}

pub async fn replace_history(
    client: &Client,
    date: NaiveDate,
    history: &[TdhHistoryRecord],
    global: &GlobalTdhHistoryRecord,
) -> Result<()> {
    let rows: Vec<TdhHistoryRow> = history.iter().map(TdhHistoryRow::from).collect();

    clear_date(client, TDH_HISTORY_TABLE, date).await?;
    clear_date(client, TDH_GLOBAL_HISTORY_TABLE, date).await?;
    insert_rows(client, TDH_HISTORY_TABLE, &rows).await?;
    insert_rows(client, TDH_GLOBAL_HISTORY_TABLE, &[GlobalTdhHistoryRow::from(global)]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(key: &str) -> TdhRecord {
        TdhRecord {
            date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            block: 77,
            consolidation_key: key.to_string(),
            wallets: vec![key.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_prepared_snapshot_tags_every_row_with_its_run() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let consolidated = vec![record("0xa-0xb")];
        let wallets = vec![record("0xa"), record("0xb")];

        let prepared = prepare_snapshot(date, 42, 77, &consolidated, &wallets).unwrap();

        assert!(prepared
            .consolidated
            .iter()
            .chain(prepared.wallets.iter())
            .all(|row| row.run_id == 42));
        assert_eq!(prepared.wallets.len(), 2);
        assert_eq!(prepared.commit.run_id, 42);
        assert_eq!(prepared.commit.block, 77);
        assert_eq!(prepared.commit.consolidations, 1);
        assert_eq!(prepared.commit.wallets, 2);
        assert_eq!(from_offset(prepared.commit.date), date);
    }
}

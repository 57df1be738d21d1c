use chrono::{DateTime, TimeZone, Utc};
use clickhouse::Client;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::db::operations::{prepare_snapshot, store_tdh_snapshot};
use crate::db::queries::{get_chain_head, get_owner_wallets};
use crate::services::consolidation::resolve_all;
use crate::services::inputs::{
    batch_consolidations, fetch_transfer_batches, load_reference, sinks, split_by_group,
    FetchLimiter,
};
use crate::services::ranking::rank_records;
use crate::services::retry::{with_backoff, RetryPolicy};
use crate::services::tdh::{check_season_table, compute_group};
use crate::types::error::TdhError;
use crate::types::models::{Consolidation, IdentitySignals, TdhRecord, TokenCatalog, Transfer};

/// Ranked output of one run.
#[derive(Debug, Clone, Default)]
pub struct TdhSnapshot {
    pub consolidated: Vec<TdhRecord>,
    pub wallets: Vec<TdhRecord>,
}

/// Runs are pinned to the start of the UTC day so that a re-run on the same
/// day scores against the same instant.
pub fn snapshot_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

/// Scores every group in parallel, then ranks consolidations and wallets as
/// two separate populations. Groups left without holdings produce no record.
pub fn score_groups(
    groups: &[(Consolidation, Vec<Transfer>)],
    catalog: &TokenCatalog,
    identity: &IdentitySignals,
    settings: &Settings,
    as_of: DateTime<Utc>,
    block: u64,
) -> Result<TdhSnapshot, TdhError> {
    let scored = groups
        .par_iter()
        .map(|(consolidation, transfers)| {
            compute_group(consolidation, transfers, catalog, identity, settings, as_of, block)
        })
        .collect::<Result<Vec<_>, TdhError>>()?;

    let mut snapshot = TdhSnapshot::default();
    for group in scored.into_iter().flatten() {
        snapshot.consolidated.push(group.consolidated);
        snapshot.wallets.extend(group.wallets);
    }

    rank_records(&mut snapshot.consolidated)?;
    rank_records(&mut snapshot.wallets)?;
    Ok(snapshot)
}

/// Computes and stores the TDH snapshot for the current day. Nothing is
/// written unless every group was fetched, scored and ranked.
pub async fn run_tdh(
    client: &Client,
    settings: &Settings,
    limiter: &Arc<FetchLimiter>,
    now: DateTime<Utc>,
) -> anyhow::Result<TdhSnapshot> {
    let started = Instant::now();
    let as_of = snapshot_instant(now);
    let policy = RetryPolicy::from(settings);
    tracing::info!("Starting TDH run as of {}", as_of);

    let (block, block_time) =
        with_backoff("chain head", policy, || get_chain_head(client, as_of)).await?;
    let reference = load_reference(client, settings, as_of).await?;
    let mismatched = check_season_table(&reference.catalog);
    if !mismatched.is_empty() {
        tracing::warn!("Scoring with an inconsistent season table for seasons {:?}", mismatched);
    }

    let mut contracts: Vec<String> = settings.contract_catalogs().into_keys().collect();
    contracts.sort();
    let contracts = &contracts;
    let owners = with_backoff("owner wallets", policy, move || {
        get_owner_wallets(client, contracts, block)
    })
    .await?;

    let consolidations = resolve_all(
        &owners,
        &reference.graph,
        settings.consolidation_cap,
        &reference.identity,
        &sinks(settings),
    );
    tracing::info!(
        "Resolved {} wallets into {} consolidations at block {} ({})",
        owners.len(),
        consolidations.len(),
        block,
        block_time
    );

    let batches = batch_consolidations(consolidations, settings.wallet_batch_size);
    let wallet_batches: Vec<Vec<String>> = batches
        .iter()
        .map(|batch| batch.iter().flat_map(|c| c.wallets.iter().cloned()).collect())
        .collect();
    let fetched = fetch_transfer_batches(client, settings, limiter, wallet_batches, block).await?;

    let mut groups: Vec<(Consolidation, Vec<Transfer>)> = Vec::new();
    for (batch, transfers) in batches.into_iter().zip(fetched) {
        let members: Vec<Vec<String>> = batch.iter().map(|c| c.wallets.clone()).collect();
        let split = split_by_group(transfers, &members);
        groups.extend(batch.into_iter().zip(split));
    }

    let scored = tokio::task::block_in_place(|| {
        score_groups(
            &groups,
            &reference.catalog,
            &reference.identity,
            settings,
            as_of,
            block,
        )
    });
    let snapshot = match scored {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("TDH run aborted, previous snapshot stays authoritative: {}", e);
            return Err(e.into());
        }
    };

    let date = as_of.date_naive();
    let run_id = Utc::now().timestamp_millis().max(0) as u64;
    let prepared = prepare_snapshot(as_of, run_id, block, &snapshot.consolidated, &snapshot.wallets)?;
    store_tdh_snapshot(client, &prepared).await?;

    tracing::info!(
        "TDH run for {} finished in {:?}: {} consolidations, {} wallets",
        date,
        started.elapsed(),
        snapshot.consolidated.len(),
        snapshot.wallets.len()
    );
    Ok(snapshot)
}

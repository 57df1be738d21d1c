use chrono::{DateTime, Utc};
use clickhouse::Client;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::db::operations::upsert_owner_metrics;
use crate::db::queries::{get_chain_head, get_owner_wallets};
use crate::db::schema::{OWNER_METRICS_CONSOLIDATED_TABLE, OWNER_METRICS_TABLE};
use crate::services::consolidation::resolve_all;
use crate::services::inputs::{fetch_transfer_batches, load_reference, sinks, FetchLimiter};
use crate::services::owner_metrics::{consolidate_metrics, wallet_metrics};
use crate::services::retry::{with_backoff, RetryPolicy};
use crate::types::models::{OwnerMetricRecord, TokenCatalog, Transfer};

/// Per-wallet metrics for one fetched batch, keyed by wallet.
pub fn batch_metrics(
    wallets: &[String],
    transfers: &[Transfer],
    catalog: &TokenCatalog,
    settings: &Settings,
) -> Vec<(String, OwnerMetricRecord)> {
    let mut touching: HashMap<&str, Vec<Transfer>> = HashMap::new();
    for transfer in transfers {
        touching
            .entry(transfer.from_address.as_str())
            .or_default()
            .push(transfer.clone());
        if transfer.to_address != transfer.from_address {
            touching
                .entry(transfer.to_address.as_str())
                .or_default()
                .push(transfer.clone());
        }
    }

    wallets
        .par_iter()
        .map(|wallet| {
            let own = touching.get(wallet.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            (wallet.clone(), wallet_metrics(wallet, own, catalog, settings))
        })
        .collect()
}

/// Recomputes owner metrics for every holder wallet and every consolidation.
pub async fn run_owner_metrics(
    client: &Client,
    settings: &Settings,
    limiter: &Arc<FetchLimiter>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let policy = RetryPolicy::from(settings);
    tracing::info!("Starting owner metrics run as of {}", now);

    let (block, _) = with_backoff("chain head", policy, || get_chain_head(client, now)).await?;
    let reference = load_reference(client, settings, now).await?;

    let mut contracts: Vec<String> = settings.contract_catalogs().into_keys().collect();
    contracts.sort();
    let contracts = &contracts;
    let excluded = sinks(settings);
    let owners: Vec<String> = with_backoff("owner wallets", policy, move || {
        get_owner_wallets(client, contracts, block)
    })
    .await?
    .into_iter()
    .filter(|w| !excluded.contains(w))
    .collect();

    let batches: Vec<Vec<String>> = owners
        .chunks(settings.wallet_batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();
    let fetched = fetch_transfer_batches(client, settings, limiter, batches.clone(), block).await?;

    let wallet_records: BTreeMap<String, OwnerMetricRecord> = tokio::task::block_in_place(|| {
        batches
            .iter()
            .zip(fetched.iter())
            .flat_map(|(wallets, transfers)| {
                batch_metrics(wallets, transfers, &reference.catalog, settings)
            })
            .collect()
    });

    let consolidations = resolve_all(
        &owners,
        &reference.graph,
        settings.consolidation_cap,
        &reference.identity,
        &excluded,
    );
    let consolidated = consolidate_metrics(&wallet_records, &consolidations);

    let per_wallet: Vec<OwnerMetricRecord> = wallet_records.into_values().collect();
    upsert_owner_metrics(client, OWNER_METRICS_TABLE, &per_wallet).await?;
    upsert_owner_metrics(client, OWNER_METRICS_CONSOLIDATED_TABLE, &consolidated).await?;

    tracing::info!(
        "Owner metrics run at block {} finished in {:?}: {} wallets, {} consolidations",
        block,
        started.elapsed(),
        per_wallet.len(),
        consolidated.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{catalog, memes, transfer};
    use crate::types::models::Catalog;

    #[test]
    fn test_batch_metrics_sees_both_sides_of_a_transfer() {
        let settings = Settings::default();
        let catalog = catalog(memes(&[1]));
        let wallets = vec!["0xa".to_string(), "0xb".to_string(), "0xidle".to_string()];
        let mut sale = transfer("0xa", "0xb", Catalog::Memes, 1, 1, 0);
        sale.value = 0.3;

        let records: BTreeMap<String, OwnerMetricRecord> =
            batch_metrics(&wallets, &[sale], &catalog, &settings)
                .into_iter()
                .collect();

        assert_eq!(records["0xa"].total.sales_count, 1);
        assert_eq!(records["0xb"].total.purchases_count_secondary, 1);
        assert_eq!(records["0xidle"].total, Default::default());
    }
}

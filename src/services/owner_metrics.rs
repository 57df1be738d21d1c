use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::Settings;
use crate::services::consolidation::consolidation_key;
use crate::types::models::{
    Catalog, Consolidation, MetricBucket, OwnerMetricRecord, TokenCatalog, Transfer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    PrimaryPurchase,
    SecondaryPurchase,
    Sale,
    TransferIn,
    TransferOut,
}

/// How `transfer` counts for `wallet`, or `None` when it does not count at all.
pub fn classify(transfer: &Transfer, wallet: &str, settings: &Settings) -> Option<Classification> {
    if settings.is_excluded_transaction(&transfer.transaction) {
        return None;
    }
    if transfer.from_address == transfer.to_address {
        return None;
    }

    let incoming = transfer.to_address == wallet;
    let outgoing = transfer.from_address == wallet;
    // Value sent to a sink is never a sale.
    let paid = transfer.value > 0.0 && !settings.is_sink(&transfer.to_address);

    match (incoming, outgoing, paid) {
        (true, _, true) => {
            if settings
                .primary_addresses
                .iter()
                .any(|p| *p == transfer.from_address)
            {
                Some(Classification::PrimaryPurchase)
            } else {
                Some(Classification::SecondaryPurchase)
            }
        }
        (true, _, false) => Some(Classification::TransferIn),
        (_, true, true) => Some(Classification::Sale),
        (_, true, false) => Some(Classification::TransferOut),
        _ => None,
    }
}

fn apply(bucket: &mut MetricBucket, classification: Classification, transfer: &Transfer, settings: &Settings) {
    let count = transfer.token_count as i64;
    match classification {
        Classification::PrimaryPurchase => {
            bucket.purchases_value += transfer.value;
            bucket.purchases_count += count;
            bucket.purchases_value_primary += transfer.value;
            bucket.purchases_count_primary += count;
        }
        Classification::SecondaryPurchase => {
            bucket.purchases_value += transfer.value;
            bucket.purchases_count += count;
            bucket.purchases_value_secondary += transfer.value;
            bucket.purchases_count_secondary += count;
        }
        Classification::Sale => {
            bucket.sales_value += transfer.value;
            bucket.sales_count += count;
        }
        Classification::TransferIn => {
            bucket.transfers_in += count;
            if transfer.from_address == settings.null_address
                || settings.primary_addresses.contains(&transfer.from_address)
            {
                bucket.airdrops += count;
            }
        }
        Classification::TransferOut => {
            bucket.transfers_out += count;
        }
    }
    if matches!(classification, Classification::Sale | Classification::TransferOut)
        && settings.is_sink(&transfer.to_address)
    {
        bucket.burns += count;
    }
}

/// Tallies one wallet's activity over its transfers. Transfers on contracts
/// outside the catalog are ignored.
pub fn wallet_metrics(
    wallet: &str,
    transfers: &[Transfer],
    catalog: &TokenCatalog,
    settings: &Settings,
) -> OwnerMetricRecord {
    let mut ordered: Vec<&Transfer> = transfers.iter().collect();
    ordered.sort_by(|a, b| a.block.cmp(&b.block).then(a.log_index.cmp(&b.log_index)));

    let mut record = OwnerMetricRecord {
        key: wallet.to_string(),
        wallets: vec![wallet.to_string()],
        ..Default::default()
    };

    for transfer in ordered {
        let Some(category) = catalog.catalog_of(&transfer.contract) else {
            continue;
        };
        let Some(classification) = classify(transfer, wallet, settings) else {
            continue;
        };

        apply(&mut record.total, classification, transfer, settings);
        apply(record.bucket_mut(category), classification, transfer, settings);
        if category == Catalog::Memes {
            if let Some(season) = catalog.seasons().season_of(transfer.token_id) {
                apply(record.seasons.entry(season).or_default(), classification, transfer, settings);
            }
        }

        record.transaction_reference = Some(
            record
                .transaction_reference
                .map_or(transfer.timestamp, |t| t.max(transfer.timestamp)),
        );
        record.block_reference = record.block_reference.max(transfer.block);
    }

    record
}

/// Sums per-wallet metrics over each wallet's consolidation. The first wallet
/// of a consolidation met in key order stands for the whole group, so members
/// are never summed twice.
pub fn consolidate_metrics(
    wallet_records: &BTreeMap<String, OwnerMetricRecord>,
    consolidations: &[Consolidation],
) -> Vec<OwnerMetricRecord> {
    let by_wallet: HashMap<&str, &Consolidation> = consolidations
        .iter()
        .flat_map(|c| c.wallets.iter().map(move |w| (w.as_str(), c)))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut consolidated = Vec::new();

    for wallet in wallet_records.keys() {
        let members: Vec<String> = by_wallet
            .get(wallet.as_str())
            .map(|c| c.wallets.clone())
            .unwrap_or_else(|| vec![wallet.clone()]);
        let key = consolidation_key(&members);
        if !seen.insert(key.clone()) {
            continue;
        }

        let mut record = OwnerMetricRecord {
            key,
            wallets: members.clone(),
            ..Default::default()
        };
        for member in &members {
            if let Some(metrics) = wallet_records.get(member) {
                record.merge(metrics);
            }
        }
        consolidated.push(record);
    }

    consolidated.sort_by(|a, b| a.key.cmp(&b.key));
    consolidated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{catalog, memes, transfer};

    fn paid(mut t: Transfer, value: f64) -> Transfer {
        t.value = value;
        t
    }

    #[test]
    fn test_classification() {
        let settings = Settings::default();
        let minter = settings.primary_addresses[1].clone();

        let primary = paid(transfer(&minter, "0xw", Catalog::Memes, 1, 1, 0), 0.1);
        let secondary = paid(transfer("0xother", "0xw", Catalog::Memes, 1, 1, 0), 0.5);
        let sale = paid(transfer("0xw", "0xother", Catalog::Memes, 1, 1, 0), 0.7);
        let gift_in = transfer("0xother", "0xw", Catalog::Memes, 1, 1, 0);
        let gift_out = transfer("0xw", "0xother", Catalog::Memes, 1, 1, 0);
        let unrelated = transfer("0xx", "0xy", Catalog::Memes, 1, 1, 0);

        assert_eq!(classify(&primary, "0xw", &settings), Some(Classification::PrimaryPurchase));
        assert_eq!(classify(&secondary, "0xw", &settings), Some(Classification::SecondaryPurchase));
        assert_eq!(classify(&sale, "0xw", &settings), Some(Classification::Sale));
        assert_eq!(classify(&gift_in, "0xw", &settings), Some(Classification::TransferIn));
        assert_eq!(classify(&gift_out, "0xw", &settings), Some(Classification::TransferOut));
        assert_eq!(classify(&unrelated, "0xw", &settings), None);
    }

    #[test]
    fn test_wallet_metrics_buckets_by_catalog_and_season() {
        let settings = Settings::default();
        let catalog = catalog(memes(&[1, 3]));
        let transfers = vec![
            paid(transfer("0xother", "0xw", Catalog::Memes, 1, 2, 0), 1.0),
            paid(transfer("0xw", "0xother", Catalog::Memes, 3, 1, 1), 0.4),
            transfer("0xw", "0xfriend", Catalog::Gradients, 9, 1, 2),
        ];
        let record = wallet_metrics("0xw", &transfers, &catalog, &settings);

        assert_eq!(record.total.purchases_count, 2);
        assert_eq!(record.total.purchases_count_secondary, 2);
        assert_eq!(record.total.sales_count, 1);
        assert_eq!(record.total.transfers_out, 1);
        assert_eq!(record.memes.purchases_value, 1.0);
        assert_eq!(record.gradients.transfers_out, 1);
        assert_eq!(record.seasons[&1].purchases_count, 2);
        assert_eq!(record.seasons[&2].sales_value, 0.4);
        assert_eq!(record.block_reference, 2);
    }

    #[test]
    fn test_burns_airdrops_and_excluded_transaction() {
        let mut settings = Settings::default();
        let null = settings.null_address.clone();
        let burn = settings.burn_address.clone();
        let anomaly = transfer("0xw", &null, Catalog::Memes, 1, 5, 3);
        settings.excluded_transactions = vec![anomaly.transaction.clone()];

        let transfers = vec![
            transfer(&null, "0xw", Catalog::Memes, 1, 3, 0),
            transfer("0xw", &burn, Catalog::Memes, 1, 1, 2),
            anomaly,
        ];
        let record = wallet_metrics("0xw", &transfers, &catalog(memes(&[1])), &settings);
        assert_eq!(record.total.airdrops, 3);
        assert_eq!(record.total.transfers_in, 3);
        assert_eq!(record.total.burns, 1);
        assert_eq!(record.total.transfers_out, 1);
    }

    #[test]
    fn test_paid_transfer_to_burn_address_is_not_a_sale() {
        let settings = Settings::default();
        let burn = settings.burn_address.clone();
        let burned = paid(transfer("0xw", &burn, Catalog::Memes, 1, 1, 0), 0.5);

        assert_eq!(
            classify(&burned, "0xw", &settings),
            Some(Classification::TransferOut)
        );
        let record = wallet_metrics("0xw", &[burned], &catalog(memes(&[1])), &settings);
        assert_eq!(record.total.sales_count, 0);
        assert_eq!(record.total.sales_value, 0.0);
        assert_eq!(record.total.transfers_out, 1);
        assert_eq!(record.total.burns, 1);
    }

    #[test]
    fn test_consolidation_sums_members_once() {
        let settings = Settings::default();
        let catalog = catalog(memes(&[1]));
        let mut wallet_records = BTreeMap::new();
        for wallet in ["0xa", "0xb", "0xc"] {
            let transfers = vec![paid(transfer("0xother", wallet, Catalog::Memes, 1, 1, 0), 1.0)];
            wallet_records.insert(
                wallet.to_string(),
                wallet_metrics(wallet, &transfers, &catalog, &settings),
            );
        }
        let consolidations = vec![Consolidation {
            key: "0xa-0xb".to_string(),
            display: String::new(),
            wallets: vec!["0xa".to_string(), "0xb".to_string()],
        }];

        let consolidated = consolidate_metrics(&wallet_records, &consolidations);
        assert_eq!(consolidated.len(), 2);
        assert_eq!(consolidated[0].key, "0xa-0xb");
        assert_eq!(consolidated[0].total.purchases_count, 2);
        assert_eq!(consolidated[0].total.purchases_value, 2.0);
        assert_eq!(consolidated[1].key, "0xc");
        assert_eq!(consolidated[1].total.purchases_count, 1);
    }
}

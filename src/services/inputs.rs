use chrono::{DateTime, Utc};
use clickhouse::Client;
use futures::stream::StreamExt;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::config::Settings;
use crate::db::queries::{
    get_confirmed_links, get_identity_signals, get_seasons, get_tokens, get_transfers_for_wallets,
};
use crate::services::consolidation::LinkGraph;
use crate::services::retry::{with_backoff, RetryPolicy};
use crate::types::error::TdhError;
use crate::types::models::{
    Catalog, Consolidation, IdentitySignals, SeasonTable, TokenCatalog, Transfer,
};

pub type FetchLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn build_limiter(settings: &Settings) -> Arc<FetchLimiter> {
    let rate = NonZeroU32::new(settings.fetch_rate_per_second).unwrap_or(nonzero!(20u32));
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// Read-only state shared by every group of one run.
pub struct ReferenceData {
    pub catalog: TokenCatalog,
    pub graph: LinkGraph,
    pub identity: IdentitySignals,
}

pub async fn load_reference(
    client: &Client,
    settings: &Settings,
    as_of: DateTime<Utc>,
) -> Result<ReferenceData, TdhError> {
    let policy = RetryPolicy::from(settings);
    let contracts = settings.contract_catalogs();
    let catalogs = &contracts;

    let (tokens, seasons, links, identity) = tokio::try_join!(
        with_backoff("token catalog", policy, move || get_tokens(client, catalogs)),
        with_backoff("season table", policy, || get_seasons(client)),
        with_backoff("consolidation links", policy, || get_confirmed_links(client)),
        with_backoff("identity signals", policy, || get_identity_signals(client)),
    )?;

    let catalog = TokenCatalog::new(
        tokens,
        SeasonTable::new(seasons),
        contracts,
        as_of,
        settings.settling(),
    );
    tracing::info!(
        "Loaded {} settled tokens ({} memes, {} gradients, {} nextgen), {} seasons, {} links, {} ENS names, {} profiles",
        catalog.tokens().len(),
        catalog.size(Catalog::Memes),
        catalog.size(Catalog::Gradients),
        catalog.size(Catalog::Nextgen),
        catalog.seasons().seasons().len(),
        links.len(),
        identity.ens.len(),
        identity.profiles.len()
    );

    Ok(ReferenceData {
        catalog,
        graph: LinkGraph::new(&links),
        identity,
    })
}

pub fn sinks(settings: &Settings) -> HashSet<String> {
    [settings.null_address.clone(), settings.burn_address.clone()]
        .into_iter()
        .collect()
}

/// Packs whole consolidations into batches of roughly `batch_size` wallets.
/// A consolidation is never split across batches.
pub fn batch_consolidations(
    consolidations: Vec<Consolidation>,
    batch_size: usize,
) -> Vec<Vec<Consolidation>> {
    let mut batches: Vec<Vec<Consolidation>> = Vec::new();
    let mut current: Vec<Consolidation> = Vec::new();
    let mut wallets = 0;
    for consolidation in consolidations {
        if wallets > 0 && wallets + consolidation.wallets.len() > batch_size {
            batches.push(std::mem::take(&mut current));
            wallets = 0;
        }
        wallets += consolidation.wallets.len();
        current.push(consolidation);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Hands every transfer to each group that has a member on either side.
pub fn split_by_group(transfers: Vec<Transfer>, groups: &[Vec<String>]) -> Vec<Vec<Transfer>> {
    let owner: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(i, wallets)| wallets.iter().map(move |w| (w.as_str(), i)))
        .collect();

    let mut split: Vec<Vec<Transfer>> = vec![Vec::new(); groups.len()];
    for transfer in transfers {
        let from = owner.get(transfer.from_address.as_str()).copied();
        let to = owner.get(transfer.to_address.as_str()).copied();
        match (from, to) {
            (Some(a), Some(b)) if a != b => {
                split[a].push(transfer.clone());
                split[b].push(transfer);
            }
            (Some(a), _) | (None, Some(a)) => split[a].push(transfer),
            (None, None) => {}
        }
    }
    split
}

/// Fetches the transfers of every wallet batch, at most `fetch_concurrency`
/// queries in flight and paced by `limiter`. The result is in batch order.
/// One batch failing after its retries fails the whole fetch.
pub async fn fetch_transfer_batches(
    client: &Client,
    settings: &Settings,
    limiter: &Arc<FetchLimiter>,
    batches: Vec<Vec<String>>,
    block: u64,
) -> Result<Vec<Vec<Transfer>>, TdhError> {
    let policy = RetryPolicy::from(settings);
    let mut contracts: Vec<String> = settings.contract_catalogs().into_keys().collect();
    contracts.sort();
    let total = batches.len();

    let futures: Vec<_> = batches
        .into_iter()
        .enumerate()
        .map(|(index, wallets)| {
            let client = client.clone();
            let limiter = limiter.clone();
            let contracts = contracts.clone();

            async move {
                let (client, limiter, contracts, wallets) = (&client, &limiter, &contracts, &wallets);
                let transfers = with_backoff("transfer fetch", policy, move || async move {
                    limiter.until_ready().await;
                    get_transfers_for_wallets(client, wallets, contracts, block).await
                })
                .await?;
                tracing::debug!(
                    "Fetched {} transfers for batch {}/{} ({} wallets)",
                    transfers.len(),
                    index + 1,
                    total,
                    wallets.len()
                );
                Ok::<_, TdhError>((index, transfers))
            }
        })
        .collect();

    let fetched: Vec<Result<(usize, Vec<Transfer>), TdhError>> = futures::stream::iter(futures)
        .buffer_unordered(settings.fetch_concurrency)
        .collect()
        .await;

    let mut ordered: Vec<Vec<Transfer>> = vec![Vec::new(); total];
    for result in fetched {
        let (index, transfers) = result?;
        ordered[index] = transfers;
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::transfer;

    fn group(wallets: &[&str]) -> Consolidation {
        let wallets: Vec<String> = wallets.iter().map(|w| w.to_string()).collect();
        Consolidation {
            key: wallets.join("-"),
            display: String::new(),
            wallets,
        }
    }

    #[test]
    fn test_batches_never_split_a_consolidation() {
        let batches = batch_consolidations(
            vec![group(&["0xa", "0xb"]), group(&["0xc"]), group(&["0xd", "0xe", "0xf"])],
            3,
        );
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(batches[1][0].wallets.len(), 3);
    }

    #[test]
    fn test_oversized_consolidation_gets_its_own_batch() {
        let batches = batch_consolidations(vec![group(&["0xa", "0xb", "0xc"])], 2);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_split_by_group_copies_cross_group_transfers() {
        let groups = vec![
            vec!["0xa".to_string(), "0xb".to_string()],
            vec!["0xc".to_string()],
        ];
        let transfers = vec![
            transfer("0xa", "0xb", Catalog::Memes, 1, 1, 0),
            transfer("0xb", "0xc", Catalog::Memes, 1, 1, 1),
            transfer("0xx", "0xc", Catalog::Memes, 2, 1, 2),
            transfer("0xx", "0xy", Catalog::Memes, 2, 1, 3),
        ];
        let split = split_by_group(transfers, &groups);
        assert_eq!(split[0].len(), 2);
        assert_eq!(split[1].len(), 2);
    }

    #[test]
    fn test_zero_rate_falls_back_to_default() {
        let settings = Settings {
            fetch_rate_per_second: 0,
            ..Settings::default()
        };
        let limiter = build_limiter(&settings);
        assert!(limiter.check().is_ok());
    }
}

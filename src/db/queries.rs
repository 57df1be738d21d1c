use chrono::{DateTime, NaiveDate, Utc};
use clickhouse::Client;
use std::collections::{HashMap, HashSet};

use crate::db::models::{
    from_offset, EnsRow, HeadRow, LinkRow, SeasonRow, TdhRow, TokenRow, TransferRow,
};
use crate::db::schema::TDH_RUNS_TABLE;
use crate::types::error::TdhError;
use crate::types::models::{
    Catalog, ConsolidationLink, IdentitySignals, SeasonBoundary, TdhRecord, Token, Transfer,
};

/// Highest indexed block at or before `as_of`, with its timestamp. An empty
/// feed means the indexer has not caught up yet.
pub async fn get_chain_head(
    client: &Client,
    as_of: DateTime<Utc>,
) -> Result<(u64, DateTime<Utc>), TdhError> {
    let head = client
        .query(
            "SELECT
                max(block) AS block,
                max(transaction_date) AS transaction_date
            FROM transactions
            WHERE transaction_date <= toDateTime(?)",
        )
        .bind(as_of.timestamp())
        .fetch_one::<HeadRow>()
        .await?;

    if head.block == 0 {
        return Err(TdhError::InputIncomplete("transfer feed is empty".to_string()));
    }
    Ok((head.block, from_offset(head.transaction_date)))
}

/// Every wallet that ever received a catalog token up to `block`.
pub async fn get_owner_wallets(
    client: &Client,
    contracts: &[String],
    block: u64,
) -> Result<Vec<String>, TdhError> {
    let wallets = client
        .query(
            "SELECT DISTINCT lower(to_address)
            FROM transactions
            WHERE contract IN ?
            AND block <= ?
            ORDER BY 1",
        )
        .bind(contracts)
        .bind(block)
        .fetch_all::<String>()
        .await?;
    Ok(wallets)
}

/// Catalog transfers with a member of `wallets` on either side, up to `block`.
pub async fn get_transfers_for_wallets(
    client: &Client,
    wallets: &[String],
    contracts: &[String],
    block: u64,
) -> Result<Vec<Transfer>, TdhError> {
    if wallets.is_empty() {
        return Ok(Vec::new());
    }

    let rows = client
        .query(
            "SELECT ?fields
            FROM transactions FINAL
            WHERE contract IN ?
            AND block <= ?
            AND (from_address IN ? OR to_address IN ?)
            ORDER BY block, log_index",
        )
        .bind(contracts)
        .bind(block)
        .bind(wallets)
        .bind(wallets)
        .fetch_all::<TransferRow>()
        .await?;

    Ok(rows.into_iter().map(Transfer::from).collect())
}

pub async fn get_tokens(
    client: &Client,
    contracts: &HashMap<String, Catalog>,
) -> Result<Vec<Token>, TdhError> {
    let addresses: Vec<&String> = contracts.keys().collect();
    let rows = client
        .query(
            "SELECT ?fields
            FROM nfts FINAL
            WHERE contract IN ?
            ORDER BY contract, id",
        )
        .bind(addresses)
        .fetch_all::<TokenRow>()
        .await?;

    let tokens: Vec<Token> = rows
        .into_iter()
        .filter_map(|row| {
            let contract = row.contract.to_lowercase();
            let catalog = *contracts.get(&contract)?;
            Some(Token {
                id: row.id,
                contract,
                catalog,
                season: None,
                mint_date: from_offset(row.mint_date),
                hodl_rate: row.hodl_rate,
            })
        })
        .collect();

    if tokens.is_empty() {
        return Err(TdhError::InputIncomplete("token catalog is empty".to_string()));
    }
    Ok(tokens)
}

pub async fn get_seasons(client: &Client) -> Result<Vec<SeasonBoundary>, TdhError> {
    let rows = client
        .query("SELECT ?fields FROM memes_seasons FINAL ORDER BY season")
        .fetch_all::<SeasonRow>()
        .await?;

    if rows.is_empty() {
        return Err(TdhError::InputIncomplete("season table is empty".to_string()));
    }
    Ok(rows.into_iter().map(SeasonBoundary::from).collect())
}

pub async fn get_confirmed_links(client: &Client) -> Result<Vec<ConsolidationLink>, TdhError> {
    let rows = client
        .query(
            "SELECT ?fields
            FROM consolidations FINAL
            WHERE confirmed",
        )
        .fetch_all::<LinkRow>()
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ConsolidationLink {
            wallet1: row.wallet1.to_lowercase(),
            wallet2: row.wallet2.to_lowercase(),
            confirmed: row.confirmed,
        })
        .collect())
}

pub async fn get_identity_signals(client: &Client) -> Result<IdentitySignals, TdhError> {
    let ens = client
        .query("SELECT ?fields FROM ens FINAL WHERE display != ''")
        .fetch_all::<EnsRow>()
        .await?;
    let profiles = client
        .query("SELECT DISTINCT lower(wallet) FROM profiles")
        .fetch_all::<String>()
        .await?;

    Ok(IdentitySignals {
        ens: ens
            .into_iter()
            .map(|row| (row.wallet.to_lowercase(), row.display))
            .collect(),
        profiles: profiles.into_iter().collect::<HashSet<String>>(),
    })
}

/// The rows of the latest committed run written to `table` for one calendar
/// day. Rows of runs that never committed are invisible.
pub async fn get_tdh_snapshot(
    client: &Client,
    table: &str,
    date: NaiveDate,
) -> Result<Vec<TdhRecord>, TdhError> {
    let day = date.format("%Y-%m-%d").to_string();
    let rows = client
        .query(&format!(
            "SELECT ?fields
            FROM {} FINAL
            WHERE toDate(date) = toDate(?)
              AND run_id = (SELECT max(run_id) FROM {} WHERE toDate(date) = toDate(?))
            ORDER BY consolidation_key",
            table, TDH_RUNS_TABLE
        ))
        .bind(&day)
        .bind(&day)
        .fetch_all::<TdhRow>()
        .await?;

    rows.into_iter().map(TdhRecord::try_from).collect()
}

/// Day of the most recent committed TDH run.
pub async fn get_latest_snapshot_date(client: &Client) -> Result<Option<NaiveDate>, TdhError> {
    let latest = client
        .query(&format!(
            "SELECT toString(max(toDate(date))) FROM {} WHERE block > 0",
            TDH_RUNS_TABLE
        ))
        .fetch_one::<String>()
        .await?;

    // max() over an empty table yields the epoch date
    Ok(NaiveDate::parse_from_str(&latest, "%Y-%m-%d")
        .ok()
        .filter(|d| *d > NaiveDate::default()))
}

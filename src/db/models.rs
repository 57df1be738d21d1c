use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::types::error::TdhError;
use crate::types::models::{
    BoostBreakdown, CategoryTdh, GlobalTdhHistoryRecord, MetricBucket, OwnerMetricRecord,
    SeasonBoundary, SeasonTdh, TdhHistoryRecord, TdhRecord, TokenTdh, Transfer,
};

pub fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn from_offset(at: OffsetDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0).unwrap_or_default()
}

#[derive(Debug, Row, Deserialize)]
pub struct TransferRow {
    pub block: u64,
    pub transaction: String,
    pub log_index: u32,
    pub from_address: String,
    pub to_address: String,
    pub contract: String,
    pub token_id: u64,
    pub token_count: u32,
    pub value: f64,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub transaction_date: OffsetDateTime,
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Transfer {
            block: row.block,
            transaction: row.transaction,
            log_index: row.log_index,
            from_address: row.from_address.to_lowercase(),
            to_address: row.to_address.to_lowercase(),
            contract: row.contract.to_lowercase(),
            token_id: row.token_id,
            token_count: row.token_count,
            value: row.value,
            timestamp: from_offset(row.transaction_date),
        }
    }
}

#[derive(Debug, Row, Deserialize)]
pub struct TokenRow {
    pub id: u64,
    pub contract: String,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub mint_date: OffsetDateTime,
    pub hodl_rate: f64,
}

#[derive(Debug, Row, Deserialize)]
pub struct SeasonRow {
    pub season: u32,
    pub start_id: u64,
    pub end_id: u64,
    pub count: u32,
}

impl From<SeasonRow> for SeasonBoundary {
    fn from(row: SeasonRow) -> Self {
        SeasonBoundary {
            season: row.season,
            start_id: row.start_id,
            end_id: row.end_id,
            count: row.count,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
pub struct LinkRow {
    pub wallet1: String,
    pub wallet2: String,
    pub confirmed: bool,
}

#[derive(Debug, Row, Deserialize)]
pub struct EnsRow {
    pub wallet: String,
    pub display: String,
}

#[derive(Debug, Row, Deserialize)]
pub struct HeadRow {
    pub block: u64,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub transaction_date: OffsetDateTime,
}

/// Commit marker of a TDH run covering both snapshot tables.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct TdhRunRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub date: OffsetDateTime,
    pub run_id: u64,
    pub block: u64,
    pub consolidations: u64,
    pub wallets: u64,
}

/// Flat form of a `TdhRecord`; token lists, seasons and the boost breakdown
/// travel as JSON strings.
#[derive(Debug, Row, Serialize, Deserialize)]
pub struct TdhRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub date: OffsetDateTime,
    pub block: u64,
    pub run_id: u64,
    pub consolidation_key: String,
    pub consolidation_display: String,
    pub wallets: Vec<String>,
    pub balance: u64,
    pub tdh: f64,
    #[serde(rename = "tdh__raw")]
    pub tdh_raw: u64,
    pub boost: f64,
    pub boosted_tdh: f64,
    pub unique_memes: u32,
    pub memes_cards_sets: u32,
    pub memes_cards_sets_minus1: u32,
    pub memes_cards_sets_minus2: u32,
    pub genesis: u32,
    pub founding: u32,
    pub memes_balance: u64,
    pub memes_tdh: f64,
    #[serde(rename = "memes_tdh__raw")]
    pub memes_tdh_raw: u64,
    pub boosted_memes_tdh: f64,
    pub gradients_balance: u64,
    pub unique_gradients: u32,
    pub gradients_tdh: f64,
    #[serde(rename = "gradients_tdh__raw")]
    pub gradients_tdh_raw: u64,
    pub boosted_gradients_tdh: f64,
    pub nextgen_balance: u64,
    pub unique_nextgen: u32,
    pub nextgen_tdh: f64,
    #[serde(rename = "nextgen_tdh__raw")]
    pub nextgen_tdh_raw: u64,
    pub boosted_nextgen_tdh: f64,
    pub seasons: String,
    pub memes: String,
    pub gradients: String,
    pub nextgen: String,
    pub boost_breakdown: String,
    pub tdh_rank: i64,
    pub tdh_rank_memes: i64,
    pub tdh_rank_gradients: i64,
    pub tdh_rank_nextgen: i64,
}

impl TryFrom<&TdhRecord> for TdhRow {
    type Error = TdhError;

    fn try_from(r: &TdhRecord) -> Result<Self, Self::Error> {
        Ok(TdhRow {
            date: to_offset(r.date),
            block: r.block,
            run_id: 0,
            consolidation_key: r.consolidation_key.clone(),
            consolidation_display: r.consolidation_display.clone(),
            wallets: r.wallets.clone(),
            balance: r.balance,
            tdh: r.tdh,
            tdh_raw: r.tdh_raw,
            boost: r.boost,
            boosted_tdh: r.boosted_tdh,
            unique_memes: r.unique_memes,
            memes_cards_sets: r.memes_cards_sets,
            memes_cards_sets_minus1: r.memes_cards_sets_minus1,
            memes_cards_sets_minus2: r.memes_cards_sets_minus2,
            genesis: r.genesis,
            founding: r.founding,
            memes_balance: r.memes.balance,
            memes_tdh: r.memes.tdh,
            memes_tdh_raw: r.memes.tdh_raw,
            boosted_memes_tdh: r.memes.boosted_tdh,
            gradients_balance: r.gradients.balance,
            unique_gradients: r.gradients.unique,
            gradients_tdh: r.gradients.tdh,
            gradients_tdh_raw: r.gradients.tdh_raw,
            boosted_gradients_tdh: r.gradients.boosted_tdh,
            nextgen_balance: r.nextgen.balance,
            unique_nextgen: r.nextgen.unique,
            nextgen_tdh: r.nextgen.tdh,
            nextgen_tdh_raw: r.nextgen.tdh_raw,
            boosted_nextgen_tdh: r.nextgen.boosted_tdh,
            seasons: serde_json::to_string(&r.seasons)?,
            memes: serde_json::to_string(&r.memes_tokens)?,
            gradients: serde_json::to_string(&r.gradients_tokens)?,
            nextgen: serde_json::to_string(&r.nextgen_tokens)?,
            boost_breakdown: serde_json::to_string(&r.boost_breakdown)?,
            tdh_rank: r.tdh_rank,
            tdh_rank_memes: r.tdh_rank_memes,
            tdh_rank_gradients: r.tdh_rank_gradients,
            tdh_rank_nextgen: r.tdh_rank_nextgen,
        })
    }
}

impl TryFrom<TdhRow> for TdhRecord {
    type Error = TdhError;

    fn try_from(row: TdhRow) -> Result<Self, Self::Error> {
        let seasons: Vec<SeasonTdh> = serde_json::from_str(&row.seasons)?;
        let memes_tokens: Vec<TokenTdh> = serde_json::from_str(&row.memes)?;
        let gradients_tokens: Vec<TokenTdh> = serde_json::from_str(&row.gradients)?;
        let nextgen_tokens: Vec<TokenTdh> = serde_json::from_str(&row.nextgen)?;
        let boost_breakdown: BoostBreakdown = serde_json::from_str(&row.boost_breakdown)?;

        Ok(TdhRecord {
            date: from_offset(row.date),
            block: row.block,
            consolidation_key: row.consolidation_key,
            consolidation_display: row.consolidation_display,
            wallets: row.wallets,
            balance: row.balance,
            tdh: row.tdh,
            tdh_raw: row.tdh_raw,
            boost: row.boost,
            boosted_tdh: row.boosted_tdh,
            unique_memes: row.unique_memes,
            memes_cards_sets: row.memes_cards_sets,
            memes_cards_sets_minus1: row.memes_cards_sets_minus1,
            memes_cards_sets_minus2: row.memes_cards_sets_minus2,
            genesis: row.genesis,
            founding: row.founding,
            memes: CategoryTdh {
                balance: row.memes_balance,
                unique: row.unique_memes,
                tdh: row.memes_tdh,
                tdh_raw: row.memes_tdh_raw,
                boosted_tdh: row.boosted_memes_tdh,
            },
            gradients: CategoryTdh {
                balance: row.gradients_balance,
                unique: row.unique_gradients,
                tdh: row.gradients_tdh,
                tdh_raw: row.gradients_tdh_raw,
                boosted_tdh: row.boosted_gradients_tdh,
            },
            nextgen: CategoryTdh {
                balance: row.nextgen_balance,
                unique: row.unique_nextgen,
                tdh: row.nextgen_tdh,
                tdh_raw: row.nextgen_tdh_raw,
                boosted_tdh: row.boosted_nextgen_tdh,
            },
            seasons,
            memes_tokens,
            gradients_tokens,
            nextgen_tokens,
            boost_breakdown,
            tdh_rank: row.tdh_rank,
            tdh_rank_memes: row.tdh_rank_memes,
            tdh_rank_gradients: row.tdh_rank_gradients,
            tdh_rank_nextgen: row.tdh_rank_nextgen,
        })
    }
}

#[derive(Debug, Row, Serialize)]
pub struct OwnerMetricRow {
    pub owner: String,
    pub wallets: Vec<String>,
    pub purchases_value: f64,
    pub purchases_count: i64,
    pub purchases_value_primary: f64,
    pub purchases_count_primary: i64,
    pub purchases_value_secondary: f64,
    pub purchases_count_secondary: i64,
    pub sales_value: f64,
    pub sales_count: i64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub airdrops: i64,
    pub burns: i64,
    pub memes: String,
    pub gradients: String,
    pub nextgen: String,
    pub seasons: String,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub transaction_reference: OffsetDateTime,
    pub block_reference: u64,
}

impl TryFrom<&OwnerMetricRecord> for OwnerMetricRow {
    type Error = TdhError;

    fn try_from(r: &OwnerMetricRecord) -> Result<Self, Self::Error> {
        let MetricBucket {
            purchases_value,
            purchases_count,
            purchases_value_primary,
            purchases_count_primary,
            purchases_value_secondary,
            purchases_count_secondary,
            sales_value,
            sales_count,
            transfers_in,
            transfers_out,
            airdrops,
            burns,
        } = r.total.clone();
        let seasons: &BTreeMap<u32, MetricBucket> = &r.seasons;

        Ok(OwnerMetricRow {
            owner: r.key.clone(),
            wallets: r.wallets.clone(),
            purchases_value,
            purchases_count,
            purchases_value_primary,
            purchases_count_primary,
            purchases_value_secondary,
            purchases_count_secondary,
            sales_value,
            sales_count,
            transfers_in,
            transfers_out,
            airdrops,
            burns,
            memes: serde_json::to_string(&r.memes)?,
            gradients: serde_json::to_string(&r.gradients)?,
            nextgen: serde_json::to_string(&r.nextgen)?,
            seasons: serde_json::to_string(seasons)?,
            transaction_reference: r
                .transaction_reference
                .map(to_offset)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            block_reference: r.block_reference,
        })
    }
}

#[derive(Debug, Row, Serialize)]
pub struct TdhHistoryRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub date: OffsetDateTime,
    pub block: u64,
    pub consolidation_key: String,
    pub wallets: Vec<String>,
    pub created_tdh: f64,
    pub destroyed_tdh: f64,
    pub net_tdh: f64,
    pub created_boosted_tdh: f64,
    pub destroyed_boosted_tdh: f64,
    pub net_boosted_tdh: f64,
    #[serde(rename = "created_tdh__raw")]
    pub created_tdh_raw: f64,
    #[serde(rename = "destroyed_tdh__raw")]
    pub destroyed_tdh_raw: f64,
    #[serde(rename = "net_tdh__raw")]
    pub net_tdh_raw: f64,
    pub created_balance: i64,
    pub destroyed_balance: i64,
    pub net_balance: i64,
}

impl From<&TdhHistoryRecord> for TdhHistoryRow {
    fn from(r: &TdhHistoryRecord) -> Self {
        TdhHistoryRow {
            date: to_offset(r.date),
            block: r.block,
            consolidation_key: r.consolidation_key.clone(),
            wallets: r.wallets.clone(),
            created_tdh: r.deltas.created_tdh,
            destroyed_tdh: r.deltas.destroyed_tdh,
            net_tdh: r.deltas.net_tdh,
            created_boosted_tdh: r.deltas.created_boosted_tdh,
            destroyed_boosted_tdh: r.deltas.destroyed_boosted_tdh,
            net_boosted_tdh: r.deltas.net_boosted_tdh,
            created_tdh_raw: r.deltas.created_tdh_raw,
            destroyed_tdh_raw: r.deltas.destroyed_tdh_raw,
            net_tdh_raw: r.deltas.net_tdh_raw,
            created_balance: r.deltas.created_balance,
            destroyed_balance: r.deltas.destroyed_balance,
            net_balance: r.deltas.net_balance,
        }
    }
}

#[derive(Debug, Row, Serialize)]
pub struct GlobalTdhHistoryRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub date: OffsetDateTime,
    pub block: u64,
    pub created_tdh: f64,
    pub destroyed_tdh: f64,
    pub net_tdh: f64,
    pub created_boosted_tdh: f64,
    pub destroyed_boosted_tdh: f64,
    pub net_boosted_tdh: f64,
    #[serde(rename = "created_tdh__raw")]
    pub created_tdh_raw: f64,
    #[serde(rename = "destroyed_tdh__raw")]
    pub destroyed_tdh_raw: f64,
    #[serde(rename = "net_tdh__raw")]
    pub net_tdh_raw: f64,
    pub created_balance: i64,
    pub destroyed_balance: i64,
    pub net_balance: i64,
    pub total_boosted_tdh: f64,
    pub total_tdh: f64,
    #[serde(rename = "total_tdh__raw")]
    pub total_tdh_raw: u64,
    pub memes_boosted_tdh: f64,
    pub gradients_boosted_tdh: f64,
    pub nextgen_boosted_tdh: f64,
    pub memes_balance: u64,
    pub gradients_balance: u64,
    pub nextgen_balance: u64,
    pub consolidation_wallets: u64,
    pub wallets: u64,
}

impl From<&GlobalTdhHistoryRecord> for GlobalTdhHistoryRow {
    fn from(r: &GlobalTdhHistoryRecord) -> Self {
        GlobalTdhHistoryRow {
            date: to_offset(r.date),
            block: r.block,
            created_tdh: r.deltas.created_tdh,
            destroyed_tdh: r.deltas.destroyed_tdh,
            net_tdh: r.deltas.net_tdh,
            created_boosted_tdh: r.deltas.created_boosted_tdh,
            destroyed_boosted_tdh: r.deltas.destroyed_boosted_tdh,
            net_boosted_tdh: r.deltas.net_boosted_tdh,
            created_tdh_raw: r.deltas.created_tdh_raw,
            destroyed_tdh_raw: r.deltas.destroyed_tdh_raw,
            net_tdh_raw: r.deltas.net_tdh_raw,
            created_balance: r.deltas.created_balance,
            destroyed_balance: r.deltas.destroyed_balance,
            net_balance: r.deltas.net_balance,
            total_boosted_tdh: r.total_boosted_tdh,
            total_tdh: r.total_tdh,
            total_tdh_raw: r.total_tdh_raw,
            memes_boosted_tdh: r.memes_boosted_tdh,
            gradients_boosted_tdh: r.gradients_boosted_tdh,
            nextgen_boosted_tdh: r.nextgen_boosted_tdh,
            memes_balance: r.memes_balance,
            gradients_balance: r.gradients_balance,
            nextgen_balance: r.nextgen_balance,
            consolidation_wallets: r.consolidation_wallets,
            wallets: r.wallets,
        }
    }
}

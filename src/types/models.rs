use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The three token families that are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    Memes,
    Gradients,
    Nextgen,
}

impl Catalog {
    pub const ALL: [Catalog; 3] = [Catalog::Memes, Catalog::Gradients, Catalog::Nextgen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Memes => "memes",
            Catalog::Gradients => "gradients",
            Catalog::Nextgen => "nextgen",
        }
    }
}

/// One token movement as delivered by the transfer feed. Addresses are lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub block: u64,
    pub transaction: String,
    pub log_index: u32,
    pub from_address: String,
    pub to_address: String,
    pub contract: String,
    pub token_id: u64,
    pub token_count: u32,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: u64,
    pub contract: String,
    pub catalog: Catalog,
    pub season: Option<u32>,
    pub mint_date: DateTime<Utc>,
    pub hodl_rate: f64,
}

/// Inclusive token-id range of one memes season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonBoundary {
    pub season: u32,
    pub start_id: u64,
    pub end_id: u64,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SeasonTable {
    seasons: Vec<SeasonBoundary>,
}

impl SeasonTable {
    pub fn new(mut seasons: Vec<SeasonBoundary>) -> Self {
        seasons.sort_by_key(|s| s.season);
        Self { seasons }
    }

    pub fn season_of(&self, token_id: u64) -> Option<u32> {
        self.seasons
            .iter()
            .find(|s| token_id >= s.start_id && token_id <= s.end_id)
            .map(|s| s.season)
    }

    pub fn seasons(&self) -> &[SeasonBoundary] {
        &self.seasons
    }

    pub fn first_season(&self) -> Option<u32> {
        self.seasons.first().map(|s| s.season)
    }
}

/// Immutable per-run view of the scored tokens.
///
/// Only tokens minted at least `settling` before the computation instant are
/// kept, so freshly minted tokens neither score nor count toward set sizes.
#[derive(Debug, Clone, Default)]
pub struct TokenCatalog {
    tokens: Vec<Token>,
    index: HashMap<(String, u64), usize>,
    contracts: HashMap<String, Catalog>,
    seasons: SeasonTable,
}

impl TokenCatalog {
    pub fn new(
        tokens: Vec<Token>,
        seasons: SeasonTable,
        contracts: HashMap<String, Catalog>,
        as_of: DateTime<Utc>,
        settling: Duration,
    ) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| t.mint_date + settling <= as_of)
            .map(|mut t| {
                if t.catalog == Catalog::Memes {
                    t.season = seasons.season_of(t.id);
                }
                t
            })
            .collect();
        tokens.sort_by(|a, b| a.catalog.cmp(&b.catalog).then(a.id.cmp(&b.id)));

        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.contract.clone(), t.id), i))
            .collect();

        Self {
            tokens,
            index,
            contracts,
            seasons,
        }
    }

    pub fn get(&self, contract: &str, id: u64) -> Option<&Token> {
        self.index
            .get(&(contract.to_string(), id))
            .map(|&i| &self.tokens[i])
    }

    /// Catalog of a contract, regardless of whether any of its tokens settled.
    pub fn catalog_of(&self, contract: &str) -> Option<Catalog> {
        self.contracts.get(contract).copied()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn tokens_in(&self, catalog: Catalog) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.catalog == catalog)
    }

    pub fn season_tokens(&self, season: u32) -> impl Iterator<Item = &Token> {
        self.tokens
            .iter()
            .filter(move |t| t.catalog == Catalog::Memes && t.season == Some(season))
    }

    pub fn size(&self, catalog: Catalog) -> usize {
        self.tokens_in(catalog).count()
    }

    pub fn seasons(&self) -> &SeasonTable {
        &self.seasons
    }
}

/// A registry row linking two wallets. Only confirmed links are honoured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationLink {
    pub wallet1: String,
    pub wallet2: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consolidation {
    pub key: String,
    pub display: String,
    pub wallets: Vec<String>,
}

/// ENS names and platform profiles, keyed by lower-case wallet.
#[derive(Debug, Clone, Default)]
pub struct IdentitySignals {
    pub ens: HashMap<String, String>,
    pub profiles: std::collections::HashSet<String>,
}

impl IdentitySignals {
    pub fn ens_name(&self, wallet: &str) -> Option<&str> {
        self.ens.get(wallet).map(|s| s.as_str())
    }

    pub fn has_ens(&self, wallets: &[String]) -> bool {
        wallets.iter().any(|w| self.ens.contains_key(w))
    }

    pub fn has_profile(&self, wallets: &[String]) -> bool {
        wallets.iter().any(|w| self.profiles.contains(w))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTdh {
    pub id: u64,
    pub balance: u32,
    pub tdh: f64,
    #[serde(rename = "tdh__raw")]
    pub tdh_raw: u64,
    /// Position among holders of this token, filled in by the rank engine.
    pub rank: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTdh {
    pub balance: u64,
    pub unique: u32,
    pub tdh: f64,
    #[serde(rename = "tdh__raw")]
    pub tdh_raw: u64,
    pub boosted_tdh: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonTdh {
    pub season: u32,
    pub balance: u64,
    pub unique: u32,
    pub sets: u32,
    pub tdh: f64,
    #[serde(rename = "tdh__raw")]
    pub tdh_raw: u64,
    pub boosted_tdh: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoostComponent {
    pub available: f64,
    pub acquired: f64,
}

impl BoostComponent {
    pub fn new(available: f64, acquired: f64) -> Self {
        Self { available, acquired }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoostBreakdown {
    pub memes_card_sets: BoostComponent,
    pub memes_seasons: BTreeMap<u32, BoostComponent>,
    pub memes_genesis: BoostComponent,
    pub memes_founding: BoostComponent,
    pub gradients: BoostComponent,
    pub ens: BoostComponent,
    pub profile: BoostComponent,
}

impl BoostBreakdown {
    pub fn components(&self) -> impl Iterator<Item = &BoostComponent> {
        [
            &self.memes_card_sets,
            &self.memes_genesis,
            &self.memes_founding,
            &self.gradients,
            &self.ens,
            &self.profile,
        ]
        .into_iter()
        .chain(self.memes_seasons.values())
    }

    pub fn total_acquired(&self) -> f64 {
        self.components().map(|c| c.acquired).sum()
    }
}

/// One scored holder (a consolidation, or a single wallet) for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TdhRecord {
    pub date: DateTime<Utc>,
    pub block: u64,
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
    pub memes: CategoryTdh,
    pub gradients: CategoryTdh,
    pub nextgen: CategoryTdh,
    pub seasons: Vec<SeasonTdh>,
    pub memes_tokens: Vec<TokenTdh>,
    pub gradients_tokens: Vec<TokenTdh>,
    pub nextgen_tokens: Vec<TokenTdh>,
    pub boost_breakdown: BoostBreakdown,
    pub tdh_rank: i64,
    pub tdh_rank_memes: i64,
    pub tdh_rank_gradients: i64,
    pub tdh_rank_nextgen: i64,
}

impl TdhRecord {
    pub fn category(&self, catalog: Catalog) -> &CategoryTdh {
        match catalog {
            Catalog::Memes => &self.memes,
            Catalog::Gradients => &self.gradients,
            Catalog::Nextgen => &self.nextgen,
        }
    }

    pub fn tokens(&self, catalog: Catalog) -> &[TokenTdh] {
        match catalog {
            Catalog::Memes => &self.memes_tokens,
            Catalog::Gradients => &self.gradients_tokens,
            Catalog::Nextgen => &self.nextgen_tokens,
        }
    }

    pub fn tokens_mut(&mut self, catalog: Catalog) -> &mut Vec<TokenTdh> {
        match catalog {
            Catalog::Memes => &mut self.memes_tokens,
            Catalog::Gradients => &mut self.gradients_tokens,
            Catalog::Nextgen => &mut self.nextgen_tokens,
        }
    }
}

/// Counts and values of one slice (all, one catalog or one season) of a wallet's activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBucket {
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
}

impl MetricBucket {
    pub fn merge(&mut self, other: &MetricBucket) {
        self.purchases_value += other.purchases_value;
        self.purchases_count += other.purchases_count;
        self.purchases_value_primary += other.purchases_value_primary;
        self.purchases_count_primary += other.purchases_count_primary;
        self.purchases_value_secondary += other.purchases_value_secondary;
        self.purchases_count_secondary += other.purchases_count_secondary;
        self.sales_value += other.sales_value;
        self.sales_count += other.sales_count;
        self.transfers_in += other.transfers_in;
        self.transfers_out += other.transfers_out;
        self.airdrops += other.airdrops;
        self.burns += other.burns;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerMetricRecord {
    /// Wallet address for per-wallet rows, consolidation key for consolidated rows.
    pub key: String,
    pub wallets: Vec<String>,
    pub total: MetricBucket,
    pub memes: MetricBucket,
    pub gradients: MetricBucket,
    pub nextgen: MetricBucket,
    pub seasons: BTreeMap<u32, MetricBucket>,
    pub transaction_reference: Option<DateTime<Utc>>,
    pub block_reference: u64,
}

impl OwnerMetricRecord {
    pub fn bucket_mut(&mut self, catalog: Catalog) -> &mut MetricBucket {
        match catalog {
            Catalog::Memes => &mut self.memes,
            Catalog::Gradients => &mut self.gradients,
            Catalog::Nextgen => &mut self.nextgen,
        }
    }

    pub fn merge(&mut self, other: &OwnerMetricRecord) {
        self.total.merge(&other.total);
        self.memes.merge(&other.memes);
        self.gradients.merge(&other.gradients);
        self.nextgen.merge(&other.nextgen);
        for (season, bucket) in &other.seasons {
            self.seasons.entry(*season).or_default().merge(bucket);
        }
        self.transaction_reference = match (self.transaction_reference, other.transaction_reference) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.block_reference = self.block_reference.max(other.block_reference);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TdhDeltas {
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

impl TdhDeltas {
    pub fn merge(&mut self, other: &TdhDeltas) {
        self.created_tdh += other.created_tdh;
        self.destroyed_tdh += other.destroyed_tdh;
        self.net_tdh += other.net_tdh;
        self.created_boosted_tdh += other.created_boosted_tdh;
        self.destroyed_boosted_tdh += other.destroyed_boosted_tdh;
        self.net_boosted_tdh += other.net_boosted_tdh;
        self.created_tdh_raw += other.created_tdh_raw;
        self.destroyed_tdh_raw += other.destroyed_tdh_raw;
        self.net_tdh_raw += other.net_tdh_raw;
        self.created_balance += other.created_balance;
        self.destroyed_balance += other.destroyed_balance;
        self.net_balance += other.net_balance;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdhHistoryRecord {
    pub date: DateTime<Utc>,
    pub block: u64,
    pub consolidation_key: String,
    pub wallets: Vec<String>,
    pub deltas: TdhDeltas,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalTdhHistoryRecord {
    pub date: DateTime<Utc>,
    pub block: u64,
    pub deltas: TdhDeltas,
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

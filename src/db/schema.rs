// Source tables. They are filled by the indexer; creating them here lets a
// fresh database start empty instead of failing every read.

pub const TRANSACTIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    block UInt64,
    transaction String,
    log_index UInt32,
    from_address String,
    to_address String,
    contract String,
    token_id UInt64,
    token_count UInt32,
    value Float64,
    transaction_date DateTime('UTC'),
    PRIMARY KEY (contract, block, log_index, transaction)
) ENGINE = ReplacingMergeTree
"#;

pub const NFTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS nfts (
    id UInt64,
    contract String,
    mint_date DateTime('UTC'),
    hodl_rate Float64,
    PRIMARY KEY (contract, id)
) ENGINE = ReplacingMergeTree
"#;

pub const MEMES_SEASONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memes_seasons (
    season UInt32,
    start_id UInt64,
    end_id UInt64,
    count UInt32,
    PRIMARY KEY (season)
) ENGINE = ReplacingMergeTree
"#;

pub const CONSOLIDATIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS consolidations (
    wallet1 String,
    wallet2 String,
    confirmed Bool,
    created_at DateTime('UTC') DEFAULT now('UTC'),
    PRIMARY KEY (wallet1, wallet2)
) ENGINE = ReplacingMergeTree
"#;

pub const ENS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ens (
    wallet String,
    display String,
    PRIMARY KEY (wallet)
) ENGINE = ReplacingMergeTree
"#;

pub const PROFILES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    wallet String,
    PRIMARY KEY (wallet)
) ENGINE = ReplacingMergeTree
"#;

// Output tables. A TDH run writes its rows under its own `run_id` and only
// becomes visible once its row lands in `tdh_runs`.

const TDH_COLUMNS: &str = r#"
    date DateTime('UTC'),
    block UInt64,
    run_id UInt64,
    consolidation_key String,
    consolidation_display String,
    wallets Array(String),
    balance UInt64,
    tdh Float64,
    tdh__raw UInt64,
    boost Float64,
    boosted_tdh Float64,
    unique_memes UInt32,
    memes_cards_sets UInt32,
    memes_cards_sets_minus1 UInt32,
    memes_cards_sets_minus2 UInt32,
    genesis UInt32,
    founding UInt32,
    memes_balance UInt64,
    memes_tdh Float64,
    memes_tdh__raw UInt64,
    boosted_memes_tdh Float64,
    gradients_balance UInt64,
    unique_gradients UInt32,
    gradients_tdh Float64,
    gradients_tdh__raw UInt64,
    boosted_gradients_tdh Float64,
    nextgen_balance UInt64,
    unique_nextgen UInt32,
    nextgen_tdh Float64,
    nextgen_tdh__raw UInt64,
    boosted_nextgen_tdh Float64,
    seasons String,
    memes String,
    gradients String,
    nextgen String,
    boost_breakdown String,
    tdh_rank Int64,
    tdh_rank_memes Int64,
    tdh_rank_gradients Int64,
    tdh_rank_nextgen Int64,
    PRIMARY KEY (date, run_id, consolidation_key)
"#;

pub fn tdh_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE = ReplacingMergeTree",
        table, TDH_COLUMNS
    )
}

const OWNER_METRICS_COLUMNS: &str = r#"
    owner String,
    wallets Array(String),
    purchases_value Float64,
    purchases_count Int64,
    purchases_value_primary Float64,
    purchases_count_primary Int64,
    purchases_value_secondary Float64,
    purchases_count_secondary Int64,
    sales_value Float64,
    sales_count Int64,
    transfers_in Int64,
    transfers_out Int64,
    airdrops Int64,
    burns Int64,
    memes String,
    gradients String,
    nextgen String,
    seasons String,
    transaction_reference DateTime('UTC'),
    block_reference UInt64,
    updated_at DateTime('UTC') DEFAULT now('UTC'),
    PRIMARY KEY (owner)
"#;

pub fn owner_metrics_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE = ReplacingMergeTree(updated_at)",
        table, OWNER_METRICS_COLUMNS
    )
}

pub const TDH_RUNS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tdh_runs (
    date DateTime('UTC'),
    run_id UInt64,
    block UInt64,
    consolidations UInt64,
    wallets UInt64,
    committed_at DateTime('UTC') DEFAULT now('UTC'),
    PRIMARY KEY (date, run_id)
) ENGINE = MergeTree
"#;

pub const TDH_HISTORY_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tdh_history (
    date DateTime('UTC'),
    block UInt64,
    consolidation_key String,
    wallets Array(String),
    created_tdh Float64,
    destroyed_tdh Float64,
    net_tdh Float64,
    created_boosted_tdh Float64,
    destroyed_boosted_tdh Float64,
    net_boosted_tdh Float64,
    created_tdh__raw Float64,
    destroyed_tdh__raw Float64,
    net_tdh__raw Float64,
    created_balance Int64,
    destroyed_balance Int64,
    net_balance Int64,
    PRIMARY KEY (date, consolidation_key)
) ENGINE = ReplacingMergeTree
"#;

pub const TDH_GLOBAL_HISTORY_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tdh_global_history (
    date DateTime('UTC'),
    block UInt64,
    created_tdh Float64,
    destroyed_tdh Float64,
    net_tdh Float64,
    created_boosted_tdh Float64,
    destroyed_boosted_tdh Float64,
    net_boosted_tdh Float64,
    created_tdh__raw Float64,
    destroyed_tdh__raw Float64,
    net_tdh__raw Float64,
    created_balance Int64,
    destroyed_balance Int64,
    net_balance Int64,
    total_boosted_tdh Float64,
    total_tdh Float64,
    total_tdh__raw UInt64,
    memes_boosted_tdh Float64,
    gradients_boosted_tdh Float64,
    nextgen_boosted_tdh Float64,
    memes_balance UInt64,
    gradients_balance UInt64,
    nextgen_balance UInt64,
    consolidation_wallets UInt64,
    wallets UInt64,
    PRIMARY KEY (date)
) ENGINE = ReplacingMergeTree
"#;

pub const TDH_TABLE: &str = "tdh";
pub const TDH_WALLET_TABLE: &str = "tdh_wallet";
pub const TDH_RUNS_TABLE: &str = "tdh_runs";
pub const OWNER_METRICS_TABLE: &str = "owners_metrics";
pub const OWNER_METRICS_CONSOLIDATED_TABLE: &str = "owners_metrics_consolidated";
pub const TDH_HISTORY_TABLE: &str = "tdh_history";
pub const TDH_GLOBAL_HISTORY_TABLE: &str = "tdh_global_history";

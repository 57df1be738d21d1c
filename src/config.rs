use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::types::models::Catalog;

const DEFAULT_MEMES_CONTRACT: &str = "0x33fd426905f149f8376e227d0c9d3340aad17af1";
const DEFAULT_GRADIENTS_CONTRACT: &str = "0x0c58ef43ff3032005e472cb5709f8908acb00205";
const DEFAULT_NEXTGEN_CONTRACT: &str = "0x45882f9bc325e14fbb298a1df930c43a874b83ae";
const DEFAULT_NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const DEFAULT_BURN_ADDRESS: &str = "0x000000000000000000000000000000000000dead";
const DEFAULT_PRIMARY_ADDRESSES: &str =
    "0x0000000000000000000000000000000000000000,0x3a3548e060be10c2614d0a4cb0c03cc9093fd799";

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_address(key: &str, default: &str) -> String {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .to_lowercase()
}

fn env_list<T: FromStr>(key: &str, default: &str) -> Vec<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.to_lowercase().parse::<T>().ok())
        .collect()
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_connect_retries: u32,

    pub memes_contract: String,
    pub gradients_contract: String,
    pub nextgen_contract: String,
    pub null_address: String,
    pub burn_address: String,
    pub primary_addresses: Vec<String>,
    pub excluded_transactions: Vec<String>,

    pub consolidation_cap: usize,
    pub settling_hours: i64,
    pub genesis_token_ids: Vec<u64>,
    pub founding_token_id: u64,
    pub boosted_season_limit: u32,

    pub fetch_concurrency: usize,
    pub fetch_rate_per_second: u32,
    pub wallet_batch_size: usize,
    pub retry_attempts: u32,
    pub retry_initial: Duration,
    pub retry_max: Duration,

    pub tdh_interval: Duration,
    pub owner_metrics_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            clickhouse_url: env::var("CLICKHOUSE_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            clickhouse_database: env::var("CLICKHOUSE_DATABASE")
                .unwrap_or_else(|_| "default".to_string()),
            clickhouse_connect_retries: env_parse("CLICKHOUSE_CONNECT_RETRIES", 5_u32),

            memes_contract: env_address("TDH_MEMES_CONTRACT", DEFAULT_MEMES_CONTRACT),
            gradients_contract: env_address("TDH_GRADIENTS_CONTRACT", DEFAULT_GRADIENTS_CONTRACT),
            nextgen_contract: env_address("TDH_NEXTGEN_CONTRACT", DEFAULT_NEXTGEN_CONTRACT),
            null_address: env_address("TDH_NULL_ADDRESS", DEFAULT_NULL_ADDRESS),
            burn_address: env_address("TDH_BURN_ADDRESS", DEFAULT_BURN_ADDRESS),
            primary_addresses: env_list("TDH_PRIMARY_ADDRESSES", DEFAULT_PRIMARY_ADDRESSES),
            excluded_transactions: env_list("TDH_EXCLUDED_TRANSACTIONS", ""),

            consolidation_cap: env_parse("TDH_CONSOLIDATION_CAP", 3_usize),
            settling_hours: env_parse("TDH_SETTLING_HOURS", 28_i64),
            genesis_token_ids: env_list("TDH_GENESIS_TOKEN_IDS", "1,2,3"),
            founding_token_id: env_parse("TDH_FOUNDING_TOKEN_ID", 4_u64),
            boosted_season_limit: env_parse("TDH_BOOSTED_SEASON_LIMIT", 5_u32),

            fetch_concurrency: env_parse("TDH_FETCH_CONCURRENCY", 8_usize).max(1),
            fetch_rate_per_second: env_parse("TDH_FETCH_RATE_PER_SECOND", 20_u32),
            wallet_batch_size: env_parse("TDH_WALLET_BATCH_SIZE", 200_usize).max(1),
            retry_attempts: env_parse("TDH_RETRY_ATTEMPTS", 5_u32).max(1),
            retry_initial: Duration::from_millis(env_parse("TDH_RETRY_INITIAL_MS", 500_u64)),
            retry_max: Duration::from_millis(env_parse("TDH_RETRY_MAX_MS", 30_000_u64)),

            tdh_interval: Duration::from_secs(env_parse("TDH_INTERVAL_SECS", 86_400_u64)),
            owner_metrics_interval: Duration::from_secs(env_parse(
                "OWNER_METRICS_INTERVAL_SECS",
                3_600_u64,
            )),
        }
    }

    pub fn contract_catalogs(&self) -> std::collections::HashMap<String, Catalog> {
        [
            (self.memes_contract.clone(), Catalog::Memes),
            (self.gradients_contract.clone(), Catalog::Gradients),
            (self.nextgen_contract.clone(), Catalog::Nextgen),
        ]
        .into_iter()
        .collect()
    }

    pub fn settling(&self) -> chrono::Duration {
        chrono::Duration::hours(self.settling_hours)
    }

    /// Addresses that can never be a consolidation member.
    pub fn is_sink(&self, address: &str) -> bool {
        address == self.null_address || address == self.burn_address
    }

    /// Settings that are valid but probably not what a production run wants.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.excluded_transactions.is_empty() {
            warnings.push(
                "TDH_EXCLUDED_TRANSACTIONS is empty, known erroneous burn-address transfers will be scored"
                    .to_string(),
            );
        }
        if self.settling_hours <= 0 {
            warnings.push(format!(
                "TDH_SETTLING_HOURS is {}, freshly minted tokens score immediately",
                self.settling_hours
            ));
        }
        warnings
    }

    pub fn is_excluded_transaction(&self, transaction: &str) -> bool {
        self.excluded_transactions
            .iter()
            .any(|t| t.eq_ignore_ascii_case(transaction))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_database: "default".to_string(),
            clickhouse_connect_retries: 5,
            memes_contract: DEFAULT_MEMES_CONTRACT.to_string(),
            gradients_contract: DEFAULT_GRADIENTS_CONTRACT.to_string(),
            nextgen_contract: DEFAULT_NEXTGEN_CONTRACT.to_string(),
            null_address: DEFAULT_NULL_ADDRESS.to_string(),
            burn_address: DEFAULT_BURN_ADDRESS.to_string(),
            primary_addresses: DEFAULT_PRIMARY_ADDRESSES
                .split(',')
                .map(str::to_string)
                .collect(),
            excluded_transactions: Vec::new(),
            consolidation_cap: 3,
            settling_hours: 28,
            genesis_token_ids: vec![1, 2, 3],
            founding_token_id: 4,
            boosted_season_limit: 5,
            fetch_concurrency: 8,
            fetch_rate_per_second: 20,
            wallet_batch_size: 200,
            retry_attempts: 5,
            retry_initial: Duration::from_millis(500),
            retry_max: Duration::from_secs(30),
            tdh_interval: Duration::from_secs(86_400),
            owner_metrics_interval: Duration::from_secs(3_600),
        }
    }
}

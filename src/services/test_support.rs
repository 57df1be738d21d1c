//! Fixtures shared by the service tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::config::Settings;
use crate::types::models::{Catalog, SeasonBoundary, SeasonTable, Token, TokenCatalog, Transfer};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(n)
}

pub fn contract(catalog: Catalog) -> String {
    let settings = Settings::default();
    match catalog {
        Catalog::Memes => settings.memes_contract,
        Catalog::Gradients => settings.gradients_contract,
        Catalog::Nextgen => settings.nextgen_contract,
    }
}

pub fn token(catalog: Catalog, id: u64, hodl_rate: f64) -> Token {
    Token {
        id,
        contract: contract(catalog),
        catalog,
        season: None,
        mint_date: day(-30),
        hodl_rate,
    }
}

pub fn memes(ids: &[u64]) -> Vec<Token> {
    ids.iter().map(|id| token(Catalog::Memes, *id, 1.0)).collect()
}

/// Season 1 covers ids 1-2, season 2 covers ids 3-4.
pub fn seasons() -> SeasonTable {
    SeasonTable::new(vec![
        SeasonBoundary {
            season: 1,
            start_id: 1,
            end_id: 2,
            count: 2,
        },
        SeasonBoundary {
            season: 2,
            start_id: 3,
            end_id: 4,
            count: 2,
        },
    ])
}

pub fn catalog(tokens: Vec<Token>) -> TokenCatalog {
    let settings = Settings::default();
    TokenCatalog::new(
        tokens,
        seasons(),
        settings.contract_catalogs(),
        day(0),
        settings.settling(),
    )
}

pub fn transfer(from: &str, to: &str, catalog: Catalog, id: u64, count: u32, on: i64) -> Transfer {
    Transfer {
        block: on.max(0) as u64,
        transaction: format!("0x{}{}{}{}", from.trim_start_matches("0x"), to.trim_start_matches("0x"), id, on),
        log_index: 0,
        from_address: from.to_string(),
        to_address: to.to_string(),
        contract: contract(catalog),
        token_id: id,
        token_count: count,
        value: 0.0,
        timestamp: day(on),
    }
}

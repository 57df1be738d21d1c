use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::config::Settings;
use crate::services::boost::{calculate_boost, check_breakdown, BoostInputs};
use crate::services::consolidation::format_address;
use crate::services::ledger::{build_ledger, HoldingLedger};
use crate::types::error::TdhError;
use crate::types::models::{
    Catalog, CategoryTdh, Consolidation, IdentitySignals, SeasonTdh, TdhRecord, Token,
    TokenCatalog, TokenTdh, Transfer,
};

/// Whole days between acquisition and `as_of`; future acquisitions count zero.
pub fn holding_days(as_of: DateTime<Utc>, acquired: DateTime<Utc>) -> u64 {
    (as_of - acquired).num_days().max(0) as u64
}

pub fn token_tdh<'a>(
    token: &Token,
    dates: impl Iterator<Item = &'a DateTime<Utc>>,
    as_of: DateTime<Utc>,
) -> TokenTdh {
    let mut balance = 0;
    let mut tdh_raw = 0;
    for acquired in dates {
        balance += 1;
        tdh_raw += holding_days(as_of, *acquired);
    }
    TokenTdh {
        id: token.id,
        balance,
        tdh: tdh_raw as f64 * token.hodl_rate,
        tdh_raw,
        rank: 0,
    }
}

/// Full sets, and sets when ignoring the one or two weakest cards, given the
/// balance held of every catalog token (zero for missing ones).
pub fn card_sets(balances: &[u32]) -> (u32, u32, u32) {
    let mut sorted = balances.to_vec();
    sorted.sort_unstable();
    let nth = |n: usize| sorted.get(n).copied().unwrap_or(0);
    (nth(0), nth(1), nth(2))
}

/// Output of one consolidation: its own record plus one per holding member.
#[derive(Debug, Clone)]
pub struct GroupTdh {
    pub consolidated: TdhRecord,
    pub wallets: Vec<TdhRecord>,
}

/// Scores one consolidation from the transfers touching its members.
pub fn compute_group(
    consolidation: &Consolidation,
    transfers: &[Transfer],
    catalog: &TokenCatalog,
    identity: &IdentitySignals,
    settings: &Settings,
    as_of: DateTime<Utc>,
    block: u64,
) -> Result<Option<GroupTdh>, TdhError> {
    let mut by_token: BTreeMap<(Catalog, u64), (&Token, Vec<&Transfer>)> = BTreeMap::new();
    for transfer in transfers {
        let Some(token) = catalog.get(&transfer.contract, transfer.token_id) else {
            continue;
        };
        by_token
            .entry((token.catalog, token.id))
            .or_insert_with(|| (token, Vec::new()))
            .1
            .push(transfer);
    }

    let ledgers: Vec<(&Token, HoldingLedger)> = by_token
        .into_values()
        .map(|(token, token_transfers)| {
            let ledger = build_ledger(
                &token_transfers,
                &consolidation.wallets,
                &settings.excluded_transactions,
            );
            (token, ledger)
        })
        .filter(|(_, ledger)| !ledger.is_empty())
        .collect();

    if ledgers.is_empty() {
        return Ok(None);
    }

    let group_holdings: Vec<(&Token, TokenTdh)> = ledgers
        .iter()
        .map(|(token, ledger)| (*token, token_tdh(token, ledger.all_dates(), as_of)))
        .collect();
    let consolidated = assemble_record(
        RecordIdentity {
            key: consolidation.key.clone(),
            display: consolidation.display.clone(),
            wallets: consolidation.wallets.clone(),
        },
        &group_holdings,
        catalog,
        identity,
        settings,
        as_of,
        block,
    )?;

    let mut wallets = Vec::new();
    for wallet in &consolidation.wallets {
        let holdings: Vec<(&Token, TokenTdh)> = ledgers
            .iter()
            .filter(|(_, ledger)| ledger.balance(wallet) > 0)
            .map(|(token, ledger)| (*token, token_tdh(token, ledger.dates(wallet), as_of)))
            .collect();
        if holdings.is_empty() {
            continue;
        }
        let display = identity
            .ens_name(wallet)
            .map(str::to_string)
            .unwrap_or_else(|| format_address(wallet));
        wallets.push(assemble_record(
            RecordIdentity {
                key: wallet.clone(),
                display,
                wallets: vec![wallet.clone()],
            },
            &holdings,
            catalog,
            identity,
            settings,
            as_of,
            block,
        )?);
    }

    Ok(Some(GroupTdh {
        consolidated,
        wallets,
    }))
}

struct RecordIdentity {
    key: String,
    display: String,
    wallets: Vec<String>,
}

fn assemble_record(
    id: RecordIdentity,
    holdings: &[(&Token, TokenTdh)],
    catalog: &TokenCatalog,
    identity: &IdentitySignals,
    settings: &Settings,
    as_of: DateTime<Utc>,
    block: u64,
) -> Result<TdhRecord, TdhError> {
    let mut record = TdhRecord {
        date: as_of,
        block,
        consolidation_key: id.key,
        consolidation_display: id.display,
        ..Default::default()
    };

    let memes_balances: HashMap<u64, u32> = holdings
        .iter()
        .filter(|(token, _)| token.catalog == Catalog::Memes)
        .map(|(token, t)| (token.id, t.balance))
        .collect();
    let balance_of = |id: u64| memes_balances.get(&id).copied().unwrap_or(0);

    for (token, t) in holdings {
        let totals = match token.catalog {
            Catalog::Memes => &mut record.memes,
            Catalog::Gradients => &mut record.gradients,
            Catalog::Nextgen => &mut record.nextgen,
        };
        totals.balance += t.balance as u64;
        totals.unique += 1;
        totals.tdh += t.tdh;
        totals.tdh_raw += t.tdh_raw;
        record.tokens_mut(token.catalog).push(t.clone());
    }

    for boundary in catalog.seasons().seasons() {
        let mut season = SeasonTdh {
            season: boundary.season,
            ..Default::default()
        };
        for (_, t) in holdings.iter().filter(|(token, _)| {
            token.catalog == Catalog::Memes && token.season == Some(boundary.season)
        }) {
            season.balance += t.balance as u64;
            season.unique += 1;
            season.tdh += t.tdh;
            season.tdh_raw += t.tdh_raw;
        }
        season.sets = catalog
            .season_tokens(boundary.season)
            .map(|token| balance_of(token.id))
            .min()
            .unwrap_or(0);
        record.seasons.push(season);
    }

    let all_memes: Vec<u32> = catalog
        .tokens_in(Catalog::Memes)
        .map(|t| balance_of(t.id))
        .collect();
    let (sets, minus1, minus2) = card_sets(&all_memes);
    record.memes_cards_sets = sets;
    record.memes_cards_sets_minus1 = minus1;
    record.memes_cards_sets_minus2 = minus2;
    record.unique_memes = record.memes.unique;
    record.genesis = settings
        .genesis_token_ids
        .iter()
        .map(|id| balance_of(*id))
        .min()
        .unwrap_or(0);
    record.founding = balance_of(settings.founding_token_id);

    record.wallets = id.wallets;
    let inputs = BoostInputs {
        card_sets: record.memes_cards_sets,
        season_sets: record
            .seasons
            .iter()
            .filter(|s| s.season <= settings.boosted_season_limit)
            .map(|s| (s.season, s.sets))
            .collect(),
        first_season: catalog.seasons().first_season(),
        genesis: record.genesis,
        founding: record.founding,
        gradients: record.gradients.balance as u32,
        has_ens: identity.has_ens(&record.wallets),
        has_profile: identity.has_profile(&record.wallets),
    };
    let (boost, breakdown) = calculate_boost(&inputs);
    check_breakdown(boost, &breakdown)?;

    record.boost = boost;
    record.boost_breakdown = breakdown;
    for totals in [&mut record.memes, &mut record.gradients, &mut record.nextgen] {
        totals.boosted_tdh = totals.tdh * boost;
    }
    for season in record.seasons.iter_mut() {
        season.boosted_tdh = season.tdh * boost;
    }

    let categories: [&CategoryTdh; 3] = [&record.memes, &record.gradients, &record.nextgen];
    record.balance = categories.iter().map(|c| c.balance).sum();
    record.tdh_raw = categories.iter().map(|c| c.tdh_raw).sum();
    record.tdh = categories.iter().map(|c| c.tdh).sum();
    record.boosted_tdh = record.tdh * boost;

    Ok(record)
}

/// Seasons whose declared size disagrees with the settled catalog once the
/// season's last token has settled.
pub fn check_season_table(catalog: &TokenCatalog) -> Vec<u32> {
    let mut mismatched = Vec::new();
    for boundary in catalog.seasons().seasons() {
        let settled: Vec<&Token> = catalog.season_tokens(boundary.season).collect();
        let last_settled = settled.iter().any(|t| t.id == boundary.end_id);
        if last_settled && settled.len() as u32 != boundary.count {
            tracing::warn!(
                "Season {} declares {} tokens but the catalog has {} in [{}, {}]",
                boundary.season,
                boundary.count,
                settled.len(),
                boundary.start_id,
                boundary.end_id
            );
            mismatched.push(boundary.season);
        }
    }
    mismatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{catalog, day, memes, transfer};

    fn single(wallet: &str) -> Consolidation {
        Consolidation {
            key: wallet.to_string(),
            display: wallet.to_string(),
            wallets: vec![wallet.to_string()],
        }
    }

    #[test]
    fn test_holding_days_truncates_and_clamps() {
        assert_eq!(holding_days(day(10), day(0)), 10);
        assert_eq!(holding_days(day(10) + chrono::Duration::hours(23), day(0)), 10);
        assert_eq!(holding_days(day(0), day(3)), 0);
    }

    #[test]
    fn test_single_unit_scenario() {
        // One unit at hodl rate 0.5, held ten days, nothing else.
        let catalog = catalog(vec![crate::services::test_support::token(
            Catalog::Nextgen,
            7,
            0.5,
        )]);
        let transfers = vec![transfer("0xminter", "0xw", Catalog::Nextgen, 7, 1, 0)];
        let group = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(10),
            1,
        )
        .unwrap()
        .unwrap();

        let record = group.consolidated;
        assert_eq!(record.tdh_raw, 10);
        assert_eq!(record.tdh, 5.0);
        assert_eq!(record.boost, 1.0);
        assert_eq!(record.boosted_tdh, 5.0);
        assert_eq!(record.balance, 1);
        assert_eq!(group.wallets.len(), 1);
    }

    #[test]
    fn test_future_acquisition_counts_balance_but_no_days() {
        let catalog = catalog(memes(&[1]));
        let transfers = vec![transfer("0xminter", "0xw", Catalog::Memes, 1, 1, 12)];
        let record = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(10),
            1,
        )
        .unwrap()
        .unwrap()
        .consolidated;
        assert_eq!(record.balance, 1);
        assert_eq!(record.tdh_raw, 0);
    }

    #[test]
    fn test_holding_days_grow_by_elapsed_days() {
        let catalog = catalog(memes(&[1, 2]));
        let transfers = vec![
            transfer("0xminter", "0xw", Catalog::Memes, 1, 2, 0),
            transfer("0xminter", "0xw", Catalog::Memes, 2, 1, 3),
        ];
        let run = |as_of| {
            compute_group(
                &single("0xw"),
                &transfers,
                &catalog,
                &IdentitySignals::default(),
                &Settings::default(),
                as_of,
                1,
            )
            .unwrap()
            .unwrap()
            .consolidated
        };
        let yesterday = run(day(20));
        let today = run(day(21));
        assert_eq!(today.tdh_raw - yesterday.tdh_raw, 3);
    }

    #[test]
    fn test_internal_transfer_is_neutral_for_consolidation() {
        let catalog = catalog(memes(&[1]));
        let group = Consolidation {
            key: "0xa-0xb".to_string(),
            display: String::new(),
            wallets: vec!["0xa".to_string(), "0xb".to_string()],
        };
        let before = vec![transfer("0xminter", "0xa", Catalog::Memes, 1, 1, 0)];
        let mut after = before.clone();
        after.push(transfer("0xa", "0xb", Catalog::Memes, 1, 1, 5));

        let settings = Settings::default();
        let identity = IdentitySignals::default();
        let a = compute_group(&group, &before, &catalog, &identity, &settings, day(9), 1)
            .unwrap()
            .unwrap();
        let b = compute_group(&group, &after, &catalog, &identity, &settings, day(9), 1)
            .unwrap()
            .unwrap();
        assert_eq!(a.consolidated.tdh_raw, 9);
        assert_eq!(b.consolidated.tdh_raw, 9);
        assert_eq!(b.wallets.len(), 1);
        assert_eq!(b.wallets[0].consolidation_key, "0xb");
        assert_eq!(b.wallets[0].tdh_raw, 9);
    }

    #[test]
    fn test_full_catalog_earns_card_set_boost() {
        let catalog = catalog(memes(&[1, 2, 3, 4]));
        let transfers: Vec<Transfer> = (1..=4)
            .map(|id| transfer("0xminter", "0xw", Catalog::Memes, id, 1, 0))
            .collect();
        let record = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(4),
            1,
        )
        .unwrap()
        .unwrap()
        .consolidated;
        assert_eq!(record.unique_memes, 4);
        assert_eq!(record.memes_cards_sets, 1);
        assert_eq!(record.boost_breakdown.memes_card_sets.acquired, 0.25);
        assert_eq!(record.boost, 1.25);
        assert_eq!(record.boosted_tdh, record.tdh * 1.25);
        assert_eq!(record.memes.boosted_tdh, record.memes.tdh * 1.25);
    }

    #[test]
    fn test_unsettled_tokens_are_ignored() {
        let mut tokens = memes(&[1, 2]);
        tokens[1].mint_date = day(9);
        let catalog = TokenCatalog::new(
            tokens,
            crate::services::test_support::seasons(),
            Settings::default().contract_catalogs(),
            day(10),
            Settings::default().settling(),
        );
        let transfers = vec![transfer("0xminter", "0xw", Catalog::Memes, 1, 1, 0)];
        let record = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(10),
            1,
        )
        .unwrap()
        .unwrap()
        .consolidated;
        // Token 2 is still settling, so token 1 alone completes the catalog.
        assert_eq!(record.memes_cards_sets, 1);
    }

    #[test]
    fn test_group_without_holdings_is_skipped() {
        let catalog = catalog(memes(&[1]));
        let transfers = vec![
            transfer("0xminter", "0xw", Catalog::Memes, 1, 1, 0),
            transfer("0xw", "0xother", Catalog::Memes, 1, 1, 2),
        ];
        let group = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(10),
            1,
        )
        .unwrap();
        assert!(group.is_none());
    }

    #[test]
    fn test_season_totals() {
        let catalog = catalog(memes(&[1, 2, 3, 4]));
        let transfers = vec![
            transfer("0xminter", "0xw", Catalog::Memes, 1, 2, 0),
            transfer("0xminter", "0xw", Catalog::Memes, 2, 1, 0),
            transfer("0xminter", "0xw", Catalog::Memes, 3, 1, 2),
        ];
        let record = compute_group(
            &single("0xw"),
            &transfers,
            &catalog,
            &IdentitySignals::default(),
            &Settings::default(),
            day(10),
            1,
        )
        .unwrap()
        .unwrap()
        .consolidated;

        assert_eq!(record.seasons.len(), 2);
        let s1 = &record.seasons[0];
        assert_eq!(s1.season, 1);
        assert_eq!(s1.balance, 3);
        assert_eq!(s1.unique, 2);
        assert_eq!(s1.tdh_raw, 30);
        assert_eq!(s1.tdh, 30.0);
        assert_eq!(s1.sets, 1);

        let s2 = &record.seasons[1];
        assert_eq!(s2.season, 2);
        assert_eq!(s2.balance, 1);
        assert_eq!(s2.unique, 1);
        assert_eq!(s2.tdh_raw, 8);
        assert_eq!(s2.tdh, 8.0);
        assert_eq!(s2.sets, 0);

        // No full catalog set, but the season 1 set still boosts.
        assert_eq!(record.memes_cards_sets, 0);
        assert_eq!(record.boost, 1.05);
        for season in &record.seasons {
            assert_eq!(season.boosted_tdh, season.tdh * record.boost);
        }
    }

    #[test]
    fn test_season_table_mismatch_is_reported() {
        // Season 2 declares ids 3-4 but token 3 is missing.
        assert_eq!(check_season_table(&catalog(memes(&[1, 2, 4]))), vec![2]);
        // Season 2's last token has not settled, so it is not checked yet.
        assert!(check_season_table(&catalog(memes(&[1, 2, 3]))).is_empty());
        assert!(check_season_table(&catalog(memes(&[1, 2, 3, 4]))).is_empty());
    }

    #[test]
    fn test_card_sets_with_missing_cards() {
        assert_eq!(card_sets(&[2, 3, 1, 4]), (1, 2, 3));
        assert_eq!(card_sets(&[0, 3, 2]), (0, 2, 3));
        assert_eq!(card_sets(&[]), (0, 0, 0));
    }
}

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::services::consolidation::consolidation_key;
use crate::types::models::{
    Catalog, GlobalTdhHistoryRecord, TdhDeltas, TdhHistoryRecord, TdhRecord,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TokenFigures {
    tdh: f64,
    boosted_tdh: f64,
    tdh_raw: f64,
    balance: i64,
}

/// Per-token figures summed over `rows`; boosted tdh uses each row's own boost.
fn token_figures(rows: &[&TdhRecord]) -> BTreeMap<(Catalog, u64), TokenFigures> {
    let mut figures: BTreeMap<(Catalog, u64), TokenFigures> = BTreeMap::new();
    for row in rows {
        for catalog in Catalog::ALL {
            for token in row.tokens(catalog) {
                let entry = figures.entry((catalog, token.id)).or_default();
                entry.tdh += token.tdh;
                entry.boosted_tdh += token.tdh * row.boost;
                entry.tdh_raw += token.tdh_raw as f64;
                entry.balance += token.balance as i64;
            }
        }
    }
    figures
}

fn split(delta: f64) -> (f64, f64) {
    if delta > 0.0 {
        (delta, 0.0)
    } else {
        (0.0, -delta)
    }
}

/// Created/destroyed/net between matched rows, accumulated token by token so
/// that a gain on one token never hides a loss on another.
fn deltas(today: &[&TdhRecord], yesterday: &[&TdhRecord]) -> TdhDeltas {
    let now = token_figures(today);
    let before = token_figures(yesterday);
    let keys: BTreeSet<&(Catalog, u64)> = now.keys().chain(before.keys()).collect();

    let mut out = TdhDeltas::default();
    for key in keys {
        let n = now.get(key).copied().unwrap_or_default();
        let b = before.get(key).copied().unwrap_or_default();

        let (created, destroyed) = split(n.tdh - b.tdh);
        out.created_tdh += created;
        out.destroyed_tdh += destroyed;

        let (created, destroyed) = split(n.boosted_tdh - b.boosted_tdh);
        out.created_boosted_tdh += created;
        out.destroyed_boosted_tdh += destroyed;

        let (created, destroyed) = split(n.tdh_raw - b.tdh_raw);
        out.created_tdh_raw += created;
        out.destroyed_tdh_raw += destroyed;

        let balance = n.balance - b.balance;
        if balance > 0 {
            out.created_balance += balance;
        } else {
            out.destroyed_balance -= balance;
        }
    }

    out.net_tdh = out.created_tdh - out.destroyed_tdh;
    out.net_boosted_tdh = out.created_boosted_tdh - out.destroyed_boosted_tdh;
    out.net_tdh_raw = out.created_tdh_raw - out.destroyed_tdh_raw;
    out.net_balance = out.created_balance - out.destroyed_balance;
    out
}

/// Pairs today's rows with yesterday's. Exact key matches (stored key or one
/// re-derived from the wallet list) win; only rows left without one fall back
/// to any unclaimed yesterday row sharing a wallet. A yesterday row is
/// claimed at most once, so a group that split is continued by one side only.
fn match_rows(today: &[TdhRecord], yesterday: &[TdhRecord]) -> (Vec<Vec<usize>>, Vec<bool>) {
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut by_wallet: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, row) in yesterday.iter().enumerate() {
        by_key.entry(row.consolidation_key.clone()).or_insert(j);
        by_key.entry(consolidation_key(&row.wallets)).or_insert(j);
        for wallet in &row.wallets {
            by_wallet.entry(wallet.as_str()).or_default().push(j);
        }
    }

    let mut claimed = vec![false; yesterday.len()];
    let mut matches: Vec<Vec<usize>> = vec![Vec::new(); today.len()];

    for (i, row) in today.iter().enumerate() {
        let candidates = [row.consolidation_key.clone(), consolidation_key(&row.wallets)];
        if let Some(&j) = candidates
            .iter()
            .filter_map(|k| by_key.get(k))
            .find(|&&j| !claimed[j])
        {
            claimed[j] = true;
            matches[i].push(j);
        }
    }

    for (i, row) in today.iter().enumerate() {
        if !matches[i].is_empty() {
            continue;
        }
        let overlapping: BTreeSet<usize> = row
            .wallets
            .iter()
            .filter_map(|w| by_wallet.get(w.as_str()))
            .flatten()
            .copied()
            .filter(|&j| !claimed[j])
            .collect();
        for j in overlapping {
            claimed[j] = true;
            matches[i].push(j);
        }
    }

    (matches, claimed)
}

/// Per-consolidation day-over-day deltas. Yesterday rows left unmatched are
/// reported as fully destroyed; unmatched today rows as fully created.
pub fn diff_snapshots(
    today: &[TdhRecord],
    yesterday: &[TdhRecord],
    date: DateTime<Utc>,
    block: u64,
) -> Vec<TdhHistoryRecord> {
    let (matches, claimed) = match_rows(today, yesterday);

    let mut history: Vec<TdhHistoryRecord> = today
        .iter()
        .zip(matches.iter())
        .map(|(row, matched)| {
            let before: Vec<&TdhRecord> = matched.iter().map(|&j| &yesterday[j]).collect();
            TdhHistoryRecord {
                date,
                block,
                consolidation_key: row.consolidation_key.clone(),
                wallets: row.wallets.clone(),
                deltas: deltas(&[row], &before),
            }
        })
        .collect();

    let destroyed = yesterday
        .iter()
        .zip(claimed.iter())
        .filter(|(_, taken)| !**taken)
        .map(|(row, _)| TdhHistoryRecord {
            date,
            block,
            consolidation_key: row.consolidation_key.clone(),
            wallets: row.wallets.clone(),
            deltas: deltas(&[], &[row]),
        });
    history.extend(destroyed);

    history.sort_by(|a, b| a.consolidation_key.cmp(&b.consolidation_key));
    tracing::info!(
        "Diffed {} rows against {} previous rows into {} history records",
        today.len(),
        yesterday.len(),
        history.len()
    );
    history
}

/// Sums every delta and recomputes the grand totals from today's snapshot.
pub fn global_rollup(
    history: &[TdhHistoryRecord],
    today: &[TdhRecord],
    date: DateTime<Utc>,
    block: u64,
) -> GlobalTdhHistoryRecord {
    let mut global = GlobalTdhHistoryRecord {
        date,
        block,
        ..Default::default()
    };
    for record in history {
        global.deltas.merge(&record.deltas);
    }
    for row in today {
        global.total_boosted_tdh += row.boosted_tdh;
        global.total_tdh += row.tdh;
        global.total_tdh_raw += row.tdh_raw;
        global.memes_boosted_tdh += row.memes.boosted_tdh;
        global.gradients_boosted_tdh += row.gradients.boosted_tdh;
        global.nextgen_boosted_tdh += row.nextgen.boosted_tdh;
        global.memes_balance += row.memes.balance;
        global.gradients_balance += row.gradients.balance;
        global.nextgen_balance += row.nextgen.balance;
        global.wallets += row.wallets.len() as u64;
    }
    global.consolidation_wallets = today.len() as u64;
    global
}

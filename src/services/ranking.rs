use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::error::TdhError;
use crate::types::models::{Catalog, TdhRecord};

/// Rank given to a record that holds nothing in a dimension.
pub const UNRANKED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDimension {
    Overall,
    Category(Catalog),
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

impl RankDimension {
    /// Comparator cascade; the first key is also the score that decides
    /// whether a record is ranked at all.
    fn compare(&self, a: &TdhRecord, b: &TdhRecord) -> Ordering {
        match self {
            RankDimension::Overall => desc(a.boosted_tdh, b.boosted_tdh)
                .then(b.tdh_raw.cmp(&a.tdh_raw))
                .then(desc(a.gradients.tdh, b.gradients.tdh))
                .then(desc(a.nextgen.tdh, b.nextgen.tdh)),
            RankDimension::Category(catalog) => {
                let (x, y) = (a.category(*catalog), b.category(*catalog));
                desc(x.boosted_tdh, y.boosted_tdh)
                    .then(desc(x.tdh, y.tdh))
                    .then(y.balance.cmp(&x.balance))
                    .then(b.balance.cmp(&a.balance))
            }
        }
    }

    fn score(&self, record: &TdhRecord) -> f64 {
        match self {
            RankDimension::Overall => record.boosted_tdh,
            RankDimension::Category(catalog) => record.category(*catalog).boosted_tdh,
        }
    }
}

/// Ordinal ranks for one dimension, indexed like `records`. Ties keep their
/// input order and still receive consecutive ranks.
pub fn rank_positions(records: &[TdhRecord], dimension: RankDimension) -> Vec<i64> {
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| dimension.compare(&records[a], &records[b]));

    let mut ranks = vec![UNRANKED; records.len()];
    for (position, &index) in order.iter().enumerate() {
        if dimension.score(&records[index]) > 0.0 {
            ranks[index] = position as i64 + 1;
        }
    }
    ranks
}

/// Assigns the four holder ranks and every per-token rank.
///
/// Records are first put in `consolidation_key` order so that tie order,
/// and therefore the whole assignment, is reproducible across runs.
pub fn rank_records(records: &mut Vec<TdhRecord>) -> Result<(), TdhError> {
    records.sort_by(|a, b| a.consolidation_key.cmp(&b.consolidation_key));

    let snapshot = &records[..];
    let ((overall, memes), (gradients, nextgen)) = rayon::join(
        || {
            rayon::join(
                || rank_positions(snapshot, RankDimension::Overall),
                || rank_positions(snapshot, RankDimension::Category(Catalog::Memes)),
            )
        },
        || {
            rayon::join(
                || rank_positions(snapshot, RankDimension::Category(Catalog::Gradients)),
                || rank_positions(snapshot, RankDimension::Category(Catalog::Nextgen)),
            )
        },
    );

    for (i, record) in records.iter_mut().enumerate() {
        record.tdh_rank = overall[i];
        record.tdh_rank_memes = memes[i];
        record.tdh_rank_gradients = gradients[i];
        record.tdh_rank_nextgen = nextgen[i];
    }

    rank_tokens(records);
    check_token_ranks(records)
}

/// (record index, position in the record's token list) for every holder of a token.
type Holders = Vec<(usize, usize)>;

fn holders_by_token(records: &[TdhRecord], catalog: Catalog) -> BTreeMap<u64, Holders> {
    let mut holders: BTreeMap<u64, Holders> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        for (j, token) in record.tokens(catalog).iter().enumerate() {
            if token.balance > 0 {
                holders.entry(token.id).or_default().push((i, j));
            }
        }
    }
    holders
}

/// Ranks holders of each token by that token's tdh, then by the holder's
/// overall boosted tdh, then by the token balance.
pub fn rank_tokens(records: &mut [TdhRecord]) {
    for catalog in Catalog::ALL {
        let holders = holders_by_token(records, catalog);
        let snapshot = &records[..];
        let assignments: Vec<(usize, usize, i64)> = holders
            .into_par_iter()
            .flat_map_iter(|(_, mut list)| {
                list.sort_by(|&(ai, aj), &(bi, bj)| {
                    let (a, b) = (&snapshot[ai], &snapshot[bi]);
                    let (ta, tb) = (&a.tokens(catalog)[aj], &b.tokens(catalog)[bj]);
                    desc(ta.tdh, tb.tdh)
                        .then(desc(a.boosted_tdh, b.boosted_tdh))
                        .then(tb.balance.cmp(&ta.balance))
                });
                list.into_iter()
                    .enumerate()
                    .map(|(position, (i, j))| (i, j, position as i64 + 1))
            })
            .collect();

        for (i, j, rank) in assignments {
            records[i].tokens_mut(catalog)[j].rank = rank;
        }
    }
}

/// Every token's ranks must be exactly 1..=holders.
pub fn check_token_ranks(records: &[TdhRecord]) -> Result<(), TdhError> {
    for catalog in Catalog::ALL {
        for (id, holders) in holders_by_token(records, catalog) {
            let mut ranks: Vec<i64> = holders
                .iter()
                .map(|&(i, j)| records[i].tokens(catalog)[j].rank)
                .collect();
            ranks.sort_unstable();
            let expected: Vec<i64> = (1..=holders.len() as i64).collect();
            if ranks != expected {
                return Err(TdhError::InvariantViolation(format!(
                    "{} token {} has {} holders but ranks {:?}",
                    catalog.as_str(),
                    id,
                    holders.len(),
                    ranks
                )));
            }
        }
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::types::models::Transfer;

/// Acquisition dates of the units of one token currently held by each member
/// wallet of a consolidation. Dates are kept in the order they were appended;
/// removals always take from the front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingLedger {
    dates: BTreeMap<String, VecDeque<DateTime<Utc>>>,
}

impl HoldingLedger {
    pub fn dates(&self, wallet: &str) -> impl Iterator<Item = &DateTime<Utc>> {
        self.dates.get(wallet).into_iter().flatten()
    }

    pub fn balance(&self, wallet: &str) -> u32 {
        self.dates.get(wallet).map(|d| d.len() as u32).unwrap_or(0)
    }

    pub fn total_balance(&self) -> u32 {
        self.dates.values().map(|d| d.len() as u32).sum()
    }

    pub fn all_dates(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.dates.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.total_balance() == 0
    }

    fn append(&mut self, wallet: &str, date: DateTime<Utc>, quantity: u32) {
        let entry = self.dates.entry(wallet.to_string()).or_default();
        entry.extend(std::iter::repeat(date).take(quantity as usize));
    }

    fn take(&mut self, wallet: &str, quantity: u32, transfer: &Transfer) -> Vec<DateTime<Utc>> {
        let entry = self.dates.entry(wallet.to_string()).or_default();
        let available = entry.len();
        if available < quantity as usize {
            tracing::warn!(
                "Wallet {} moves {} of {}#{} in {} but only {} acquisitions are known, clamping",
                wallet,
                quantity,
                transfer.contract,
                transfer.token_id,
                transfer.transaction,
                available
            );
        }
        let n = available.min(quantity as usize);
        entry.drain(..n).collect()
    }
}

/// Replays one token's transfers among a consolidation's members.
///
/// External acquisitions append the transfer date. Internal moves carry the
/// source's oldest dates over unchanged. External disposals drop the oldest
/// dates. Transfers listed in `excluded_transactions` are skipped entirely.
pub fn build_ledger(
    transfers: &[&Transfer],
    members: &[String],
    excluded_transactions: &[String],
) -> HoldingLedger {
    let members: HashSet<&str> = members.iter().map(|m| m.as_str()).collect();

    let mut ordered: Vec<&Transfer> = transfers.to_vec();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.block.cmp(&b.block))
            .then(a.log_index.cmp(&b.log_index))
    });

    let mut ledger = HoldingLedger::default();
    for transfer in ordered {
        if excluded_transactions
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&transfer.transaction))
        {
            tracing::debug!("Skipping excluded transaction {}", transfer.transaction);
            continue;
        }

        let from_member = members.contains(transfer.from_address.as_str());
        let to_member = members.contains(transfer.to_address.as_str());

        match (from_member, to_member) {
            (false, true) => {
                ledger.append(&transfer.to_address, transfer.timestamp, transfer.token_count);
            }
            (true, true) => {
                let moved = ledger.take(&transfer.from_address, transfer.token_count, transfer);
                let entry = ledger.dates.entry(transfer.to_address.clone()).or_default();
                entry.extend(moved);
            }
            (true, false) => {
                ledger.take(&transfer.from_address, transfer.token_count, transfer);
            }
            (false, false) => {}
        }
    }

    ledger.dates.retain(|_, d| !d.is_empty());
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::day;

    fn transfer(from: &str, to: &str, count: u32, on: i64, tx: &str) -> Transfer {
        Transfer {
            block: on as u64,
            transaction: tx.to_string(),
            log_index: 0,
            from_address: from.to_string(),
            to_address: to.to_string(),
            contract: "0xmemes".to_string(),
            token_id: 1,
            token_count: count,
            value: 0.0,
            timestamp: day(on),
        }
    }

    fn members(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_external_acquisition_appends_dates() {
        let t = transfer("0xseller", "0xa", 2, 3, "0x1");
        let ledger = build_ledger(&[&t], &members(&["0xa"]), &[]);
        assert_eq!(ledger.balance("0xa"), 2);
        assert!(ledger.dates("0xa").all(|d| *d == day(3)));
    }

    #[test]
    fn test_internal_move_preserves_acquisition_date() {
        let buy = transfer("0xseller", "0xa", 1, 0, "0x1");
        let mv = transfer("0xa", "0xb", 1, 5, "0x2");
        let ledger = build_ledger(&[&mv, &buy], &members(&["0xa", "0xb"]), &[]);
        assert_eq!(ledger.balance("0xa"), 0);
        assert_eq!(ledger.dates("0xb").copied().collect::<Vec<_>>(), vec![day(0)]);
    }

    #[test]
    fn test_external_disposal_removes_oldest_first() {
        let first = transfer("0xseller", "0xa", 1, 0, "0x1");
        let second = transfer("0xseller", "0xa", 1, 4, "0x2");
        let sale = transfer("0xa", "0xbuyer", 1, 6, "0x3");
        let ledger = build_ledger(&[&first, &second, &sale], &members(&["0xa"]), &[]);
        assert_eq!(ledger.balance("0xa"), 1);
        assert_eq!(ledger.dates("0xa").copied().collect::<Vec<_>>(), vec![day(4)]);
    }

    #[test]
    fn test_overdrawn_source_is_clamped() {
        let sale = transfer("0xa", "0xbuyer", 3, 1, "0x1");
        let buy = transfer("0xseller", "0xa", 1, 2, "0x2");
        let ledger = build_ledger(&[&sale, &buy], &members(&["0xa"]), &[]);
        assert_eq!(ledger.balance("0xa"), 1);
    }

    #[test]
    fn test_excluded_transaction_is_ignored() {
        let buy = transfer("0xseller", "0xa", 1, 0, "0x1");
        let bogus = transfer("0xa", "0x000000000000000000000000000000000000dead", 1, 2, "0xBAD");
        let ledger = build_ledger(&[&buy, &bogus], &members(&["0xa"]), &["0xbad".to_string()]);
        assert_eq!(ledger.balance("0xa"), 1);
    }
}

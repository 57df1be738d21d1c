use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::types::models::{Consolidation, ConsolidationLink, IdentitySignals};

pub fn consolidation_key(wallets: &[String]) -> String {
    let mut sorted: Vec<String> = wallets.iter().map(|w| w.to_lowercase()).collect();
    sorted.sort();
    sorted.dedup();
    sorted.join("-")
}

/// `0x33fd...7af1` style shortening used when no ENS name is known.
pub fn format_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

pub fn consolidation_display(wallets: &[String], identity: &IdentitySignals) -> String {
    wallets
        .iter()
        .map(|w| {
            identity
                .ens_name(w)
                .map(str::to_string)
                .unwrap_or_else(|| format_address(w))
        })
        .collect::<Vec<_>>()
        .join(" - ")
}

/// Undirected graph of confirmed links. Neighbour sets are ordered so that
/// traversal, and therefore group membership, does not depend on input order.
#[derive(Debug, Default)]
pub struct LinkGraph {
    neighbours: HashMap<String, BTreeSet<String>>,
}

impl LinkGraph {
    pub fn new(links: &[ConsolidationLink]) -> Self {
        let mut neighbours: HashMap<String, BTreeSet<String>> = HashMap::new();
        for link in links.iter().filter(|l| l.confirmed) {
            let a = link.wallet1.to_lowercase();
            let b = link.wallet2.to_lowercase();
            if a == b {
                continue;
            }
            neighbours.entry(a.clone()).or_default().insert(b.clone());
            neighbours.entry(b).or_default().insert(a);
        }
        Self { neighbours }
    }

    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        self.neighbours
            .get(a)
            .map(|n| n.contains(b))
            .unwrap_or(false)
    }

    /// Members of the group anchored at `wallet`, sorted.
    ///
    /// A candidate joins only when it is linked to every member already in
    /// the group, which keeps chains of partial links from merging unrelated
    /// wallets. Wallets in `excluded` never join.
    pub fn resolve(&self, wallet: &str, cap: usize, excluded: &HashSet<String>) -> Vec<String> {
        let wallet = wallet.to_lowercase();
        let mut members = vec![wallet.clone()];
        let mut queue = VecDeque::from([wallet.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some(candidates) = self.neighbours.get(&current) else {
                continue;
            };
            for candidate in candidates {
                if members.contains(candidate) || excluded.contains(candidate) {
                    continue;
                }
                if !members.iter().all(|m| self.is_linked(m, candidate)) {
                    continue;
                }
                if members.len() >= cap {
                    tracing::warn!(
                        "Consolidation of {} is at its cap of {}, leaving out linked wallet {}",
                        wallet,
                        cap,
                        candidate
                    );
                    continue;
                }
                members.push(candidate.clone());
                queue.push_back(candidate.clone());
            }
        }

        members.sort();
        members
    }
}

/// Partitions `wallets` into consolidations. Wallets are visited in sorted
/// order and each one lands in exactly one group; `sinks` are neither
/// resolved nor allowed to join a group.
pub fn resolve_all(
    wallets: &[String],
    graph: &LinkGraph,
    cap: usize,
    identity: &IdentitySignals,
    sinks: &HashSet<String>,
) -> Vec<Consolidation> {
    let ordered: BTreeSet<String> = wallets.iter().map(|w| w.to_lowercase()).collect();
    let mut assigned: HashSet<String> = sinks.clone();
    let mut consolidations = Vec::new();

    for wallet in ordered {
        if assigned.contains(&wallet) {
            continue;
        }
        let consolidation = resolve_consolidation(&wallet, graph, cap, identity, &assigned);
        assigned.extend(consolidation.wallets.iter().cloned());
        consolidations.push(consolidation);
    }

    consolidations
}

/// The consolidation anchored at `wallet`. Wallets in `excluded` never join.
pub fn resolve_consolidation(
    wallet: &str,
    graph: &LinkGraph,
    cap: usize,
    identity: &IdentitySignals,
    excluded: &HashSet<String>,
) -> Consolidation {
    let members = graph.resolve(wallet, cap.max(1), excluded);
    Consolidation {
        key: consolidation_key(&members),
        display: consolidation_display(&members, identity),
        wallets: members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(a: &str, b: &str) -> ConsolidationLink {
        ConsolidationLink {
            wallet1: a.to_string(),
            wallet2: b.to_string(),
            confirmed: true,
        }
    }

    fn wallets(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_unlinked_wallet_is_singleton() {
        let graph = LinkGraph::new(&[]);
        let c = resolve_consolidation("0xaaa", &graph, 3, &IdentitySignals::default(), &HashSet::new());
        assert_eq!(c.wallets, wallets(&["0xaaa"]));
        assert_eq!(c.key, "0xaaa");
    }

    #[test]
    fn test_unconfirmed_links_are_ignored() {
        let graph = LinkGraph::new(&[ConsolidationLink {
            wallet1: "0xaaa".to_string(),
            wallet2: "0xbbb".to_string(),
            confirmed: false,
        }]);
        let c = resolve_consolidation("0xaaa", &graph, 3, &IdentitySignals::default(), &HashSet::new());
        assert_eq!(c.wallets.len(), 1);
    }

    #[test]
    fn test_key_is_independent_of_anchor() {
        let graph = LinkGraph::new(&[link("0xccc", "0xaaa"), link("0xaaa", "0xbbb"), link("0xbbb", "0xccc")]);
        let identity = IdentitySignals::default();
        let from_a = resolve_consolidation("0xaaa", &graph, 3, &identity, &HashSet::new());
        let from_c = resolve_consolidation("0xccc", &graph, 3, &identity, &HashSet::new());
        assert_eq!(from_a.key, "0xaaa-0xbbb-0xccc");
        assert_eq!(from_a, from_c);
    }

    #[test]
    fn test_chain_of_partial_links_does_not_merge() {
        // a-b and b-c are linked, a-c is not.
        let graph = LinkGraph::new(&[link("0xaaa", "0xbbb"), link("0xbbb", "0xccc")]);
        let all = resolve_all(
            &wallets(&["0xccc", "0xbbb", "0xaaa"]),
            &graph,
            3,
            &IdentitySignals::default(),
            &HashSet::new(),
        );
        let keys: Vec<&str> = all.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["0xaaa-0xbbb", "0xccc"]);
    }

    #[test]
    fn test_cap_excludes_fully_linked_extra_wallet() {
        let ws = ["0xaaa", "0xbbb", "0xccc", "0xddd"];
        let mut links = Vec::new();
        for (i, a) in ws.iter().enumerate() {
            for b in &ws[i + 1..] {
                links.push(link(a, b));
            }
        }
        let graph = LinkGraph::new(&links);
        let all = resolve_all(&wallets(&ws), &graph, 3, &IdentitySignals::default(), &HashSet::new());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].wallets, wallets(&["0xaaa", "0xbbb", "0xccc"]));
        assert_eq!(all[1].wallets, wallets(&["0xddd"]));
    }

    #[test]
    fn test_sinks_never_join() {
        let graph = LinkGraph::new(&[link("0xaaa", "0x000")]);
        let sinks: HashSet<String> = ["0x000".to_string()].into_iter().collect();
        let all = resolve_all(&wallets(&["0xaaa", "0x000"]), &graph, 3, &IdentitySignals::default(), &sinks);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].wallets, wallets(&["0xaaa"]));
    }

    #[test]
    fn test_single_lookup_skips_already_assigned_wallets() {
        let graph = LinkGraph::new(&[link("0xaaa", "0xbbb"), link("0xaaa", "0xccc"), link("0xbbb", "0xccc")]);
        let assigned: HashSet<String> = ["0xbbb".to_string()].into_iter().collect();
        let c = resolve_consolidation("0xaaa", &graph, 3, &IdentitySignals::default(), &assigned);
        assert_eq!(c.wallets, wallets(&["0xaaa", "0xccc"]));
        assert_eq!(c.key, "0xaaa-0xccc");
    }

    #[test]
    fn test_display_prefers_ens() {
        let mut identity = IdentitySignals::default();
        identity
            .ens
            .insert("0x33fd426905f149f8376e227d0c9d3340aad17af1".to_string(), "punk6529.eth".to_string());
        let display = consolidation_display(
            &wallets(&[
                "0x33fd426905f149f8376e227d0c9d3340aad17af1",
                "0x45882f9bc325e14fbb298a1df930c43a874b83ae",
            ]),
            &identity,
        );
        assert_eq!(display, "punk6529.eth - 0x4588...83ae");
    }
}

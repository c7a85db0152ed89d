// src/graph/mod.rs
pub mod ledger;

pub use ledger::{LedgerClient, StaticLedger};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::AnalysisResult;
use crate::types::{validate_address, AddressInfo, ExpansionParams, GraphStats, TxEdge};

/// Directed transaction multigraph. Edge identity is the tx hash: merging
/// the same hash twice is a no-op, while distinct transactions between the
/// same pair of addresses stay as parallel edges.
pub struct TransactionGraph {
    seed: String,
    chain: String,
    graph: StableDiGraph<AddressInfo, TxEdge>,
    node_map: HashMap<String, NodeIndex>,
    edge_map: HashMap<String, EdgeIndex>,
    depth_reached: u32,
    truncated: bool,
}

/// Outcome of one edge merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Duplicate,
    BudgetDenied,
}

/// Serializable form of a graph: the edge set plus expansion flags.
/// Rebuilding from a snapshot reproduces the graph exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub seed: String,
    pub chain: String,
    pub edges: Vec<TxEdge>,
    pub depth_reached: u32,
    pub truncated: bool,
}

impl TransactionGraph {
    pub fn new(seed: impl Into<String>, chain: impl Into<String>) -> Self {
        let seed = seed.into();
        let chain = chain.into();
        let mut graph = Self {
            seed: seed.clone(),
            chain,
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
            edge_map: HashMap::new(),
            depth_reached: 0,
            truncated: false,
        };
        graph.get_or_add_node(&seed);
        graph
    }

    /// Build a graph directly from an edge list, bypassing expansion.
    pub fn from_edges(
        seed: impl Into<String>,
        chain: impl Into<String>,
        edges: Vec<TxEdge>,
    ) -> Self {
        let mut graph = Self::new(seed, chain);
        for edge in edges {
            graph.merge_edge(edge);
        }
        graph
    }

    fn get_or_add_node(&mut self, address: &str) -> NodeIndex {
        match self.node_map.get(address) {
            Some(&idx) => idx,
            None => {
                let info = AddressInfo::new(address, self.chain.clone());
                let idx = self.graph.add_node(info);
                self.node_map.insert(address.to_string(), idx);
                idx
            }
        }
    }

    /// Merge an edge keyed by tx hash. Duplicates are ignored so
    /// re-expanding identical parameters never double-counts.
    pub fn merge_edge(&mut self, edge: TxEdge) -> MergeOutcome {
        self.merge_edge_bounded(edge, usize::MAX)
    }

    /// Merge an edge unless doing so would push the node count past
    /// `node_budget`.
    pub fn merge_edge_bounded(&mut self, edge: TxEdge, node_budget: usize) -> MergeOutcome {
        if self.edge_map.contains_key(&edge.tx_hash) {
            return MergeOutcome::Duplicate;
        }

        let mut new_nodes = 0;
        if !self.node_map.contains_key(&edge.from) {
            new_nodes += 1;
        }
        if edge.to != edge.from && !self.node_map.contains_key(&edge.to) {
            new_nodes += 1;
        }
        if self.node_map.len() + new_nodes > node_budget {
            return MergeOutcome::BudgetDenied;
        }

        let from_idx = self.get_or_add_node(&edge.from);
        let to_idx = self.get_or_add_node(&edge.to);

        if let Some(info) = self.graph.node_weight_mut(from_idx) {
            info.record_edge(edge.value, edge.timestamp, true);
        }
        if to_idx != from_idx {
            if let Some(info) = self.graph.node_weight_mut(to_idx) {
                info.record_edge(edge.value, edge.timestamp, false);
            }
        } else if let Some(info) = self.graph.node_weight_mut(to_idx) {
            // Self-transfer: one transaction, both totals.
            info.total_in += edge.value;
        }

        let hash = edge.tx_hash.clone();
        let edge_idx = self.graph.add_edge(from_idx, to_idx, edge);
        self.edge_map.insert(hash, edge_idx);
        MergeOutcome::Merged
    }

    pub fn contains_tx(&self, tx_hash: &str) -> bool {
        self.edge_map.contains_key(tx_hash)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.node_map.contains_key(address)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, address: &str) -> Option<&AddressInfo> {
        self.node_map
            .get(address)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Attach a discovered (non-authoritative) label to an address.
    pub fn add_label(&mut self, address: &str, label: impl Into<String>) {
        if let Some(&idx) = self.node_map.get(address) {
            if let Some(info) = self.graph.node_weight_mut(idx) {
                let label = label.into();
                if !info.labels.contains(&label) {
                    info.labels.push(label);
                }
            }
        }
    }

    /// All addresses in deterministic (sorted) order.
    pub fn addresses(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.node_map.keys().map(|s| s.as_str()).collect();
        out.sort_unstable();
        out
    }

    /// All edges in deterministic (timestamp, tx hash) order.
    pub fn edges_sorted(&self) -> Vec<&TxEdge> {
        let mut edges: Vec<&TxEdge> = self.graph.edge_weights().collect();
        edges.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        edges
    }

    /// Outgoing edges of an address in (timestamp, tx hash) order.
    pub fn edges_from(&self, address: &str) -> Vec<&TxEdge> {
        let mut edges: Vec<&TxEdge> = match self.node_map.get(address) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, petgraph::Direction::Outgoing)
                .map(|e| e.weight())
                .collect(),
            None => Vec::new(),
        };
        edges.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        edges
    }

    /// Incoming edges of an address in (timestamp, tx hash) order.
    pub fn edges_to(&self, address: &str) -> Vec<&TxEdge> {
        let mut edges: Vec<&TxEdge> = match self.node_map.get(address) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, petgraph::Direction::Incoming)
                .map(|e| e.weight())
                .collect(),
            None => Vec::new(),
        };
        edges.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        edges
    }

    /// Underlying petgraph storage, for structural algorithms.
    pub fn inner(&self) -> &StableDiGraph<AddressInfo, TxEdge> {
        &self.graph
    }

    pub fn node_index(&self, address: &str) -> Option<NodeIndex> {
        self.node_map.get(address).copied()
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn depth_reached(&self) -> u32 {
        self.depth_reached
    }

    pub(crate) fn set_depth_reached(&mut self, depth: u32) {
        self.depth_reached = depth;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            total_value: self.graph.edge_weights().map(|e| e.value).sum(),
            depth_reached: self.depth_reached,
            truncated: self.truncated,
        }
    }

    /// Stable content fingerprint for cache keying: seed, chain and the
    /// sorted tx-hash set.
    pub fn fingerprint(&self) -> String {
        let mut hashes: Vec<&str> = self.edge_map.keys().map(|s| s.as_str()).collect();
        hashes.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.seed.hash(&mut hasher);
        self.chain.hash(&mut hasher);
        for h in hashes {
            h.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            seed: self.seed.clone(),
            chain: self.chain.clone(),
            edges: self.edges_sorted().into_iter().cloned().collect(),
            depth_reached: self.depth_reached,
            truncated: self.truncated,
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::from_edges(snapshot.seed, snapshot.chain, snapshot.edges);
        graph.depth_reached = snapshot.depth_reached;
        graph.truncated = snapshot.truncated;
        graph
    }
}

/// Assembles bounded transaction graphs by breadth-first expansion against
/// the ledger collaborator.
pub struct GraphBuilder {
    ledger: Arc<dyn LedgerClient>,
}

impl GraphBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Expand from `seed` under the given budgets. A ledger outage mid-hop
    /// degrades to a truncated partial graph instead of failing the
    /// request; only input errors reject it.
    pub async fn expand(
        &self,
        seed: &str,
        params: &ExpansionParams,
    ) -> AnalysisResult<TransactionGraph> {
        validate_address(seed)?;
        params.validate()?;

        let started = Instant::now();
        let mut graph = TransactionGraph::new(seed, &params.chain);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(seed.to_string());
        let mut frontier = vec![seed.to_string()];

        'expansion: for depth in 1..=params.max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier: Vec<String> = Vec::new();
            let mut merged_any = false;

            for address in &frontier {
                if started.elapsed().as_millis() as u64 > params.time_budget_ms {
                    debug!(seed, depth, "expansion time budget reached");
                    graph.mark_truncated();
                    break 'expansion;
                }

                let edges = match self
                    .ledger
                    .get_edges(address, &params.chain, params.direction, params.min_value)
                    .await
                {
                    Ok(edges) => edges,
                    Err(e) if e.is_recoverable() => {
                        warn!(address = %address, error = %e, "ledger failed mid-expansion, truncating");
                        graph.mark_truncated();
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                for edge in edges {
                    let counterparty = if edge.from == *address {
                        edge.to.clone()
                    } else {
                        edge.from.clone()
                    };

                    match graph.merge_edge_bounded(edge, params.node_budget) {
                        MergeOutcome::Merged => {
                            merged_any = true;
                            if visited.insert(counterparty.clone()) {
                                next_frontier.push(counterparty);
                            }
                        }
                        MergeOutcome::Duplicate => {}
                        MergeOutcome::BudgetDenied => {
                            graph.mark_truncated();
                        }
                    }
                }
            }

            if merged_any {
                graph.set_depth_reached(depth);
            }
            frontier = next_frontier;

            // Long expansions must not starve other requests.
            tokio::task::yield_now().await;
        }

        if !frontier.is_empty() {
            // Unexpanded frontier beyond max depth means the graph is a
            // window, not the full neighborhood.
            graph.mark_truncated();
        }

        debug!(
            seed,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            depth = graph.depth_reached(),
            truncated = graph.is_truncated(),
            "graph expansion finished"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::types::{Direction, EdgeKind};
    use async_trait::async_trait;
    use chrono::Utc;

    fn chain_edges() -> Vec<TxEdge> {
        let t = Utc::now();
        vec![
            TxEdge::new("0x01", "0xaa", "0xbb", 100.0, t),
            TxEdge::new("0x02", "0xbb", "0xcc", 60.0, t + chrono::Duration::minutes(10)),
            TxEdge::new("0x03", "0xcc", "0xdd", 35.0, t + chrono::Duration::minutes(20)),
            TxEdge::new("0x04", "0xdd", "0xee", 20.0, t + chrono::Duration::minutes(30)),
        ]
    }

    #[test]
    fn test_merge_is_idempotent() {
        let t = Utc::now();
        let mut graph = TransactionGraph::new("0xaa", "ethereum");
        let edge = TxEdge::new("0x01", "0xaa", "0xbb", 5.0, t);

        assert_eq!(graph.merge_edge(edge.clone()), MergeOutcome::Merged);
        assert_eq!(graph.merge_edge(edge), MergeOutcome::Duplicate);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node("0xbb").unwrap().total_in, 5.0);
    }

    #[test]
    fn test_parallel_edges_are_preserved() {
        let t = Utc::now();
        let mut graph = TransactionGraph::new("0xaa", "ethereum");
        graph.merge_edge(TxEdge::new("0x01", "0xaa", "0xbb", 5.0, t));
        graph.merge_edge(TxEdge::new("0x02", "0xaa", "0xbb", 7.0, t));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges_from("0xaa").len(), 2);
    }

    #[test]
    fn test_node_budget_denies_merge() {
        let t = Utc::now();
        let mut graph = TransactionGraph::new("0xaa", "ethereum");
        assert_eq!(
            graph.merge_edge_bounded(TxEdge::new("0x01", "0xaa", "0xbb", 5.0, t), 2),
            MergeOutcome::Merged
        );
        assert_eq!(
            graph.merge_edge_bounded(TxEdge::new("0x02", "0xbb", "0xcc", 5.0, t), 2),
            MergeOutcome::BudgetDenied
        );
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let graph = TransactionGraph::from_edges("0xaa", "ethereum", chain_edges());
        let restored = TransactionGraph::from_snapshot(graph.snapshot());

        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(restored.edge_count(), graph.edge_count());
        assert_eq!(restored.fingerprint(), graph.fingerprint());
    }

    #[tokio::test]
    async fn test_expansion_respects_depth() {
        let ledger = Arc::new(StaticLedger::new("ethereum", chain_edges()));
        let builder = GraphBuilder::new(ledger);
        let params = ExpansionParams {
            max_depth: 2,
            ..ExpansionParams::default()
        };

        let graph = builder.expand("0xaa", &params).await.unwrap();
        assert!(graph.depth_reached() <= 2);
        assert!(graph.contains_address("0xcc"));
        // 0xdd is three hops out
        assert!(!graph.contains_address("0xdd"));
        assert!(graph.is_truncated());
    }

    #[tokio::test]
    async fn test_expansion_respects_node_budget() {
        let ledger = Arc::new(StaticLedger::new("ethereum", chain_edges()));
        let builder = GraphBuilder::new(ledger);
        let params = ExpansionParams {
            max_depth: 10,
            node_budget: 3,
            ..ExpansionParams::default()
        };

        let graph = builder.expand("0xaa", &params).await.unwrap();
        assert!(graph.node_count() <= 3);
        assert!(graph.is_truncated());
    }

    #[tokio::test]
    async fn test_expansion_is_idempotent() {
        let ledger = Arc::new(StaticLedger::new("ethereum", chain_edges()));
        let builder = GraphBuilder::new(ledger);
        let params = ExpansionParams::default();

        let first = builder.expand("0xaa", &params).await.unwrap();
        let second = builder.expand("0xaa", &params).await.unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.edge_count(), second.edge_count());
    }

    struct FlakyLedger {
        inner: StaticLedger,
        fail_for: String,
    }

    #[async_trait]
    impl LedgerClient for FlakyLedger {
        async fn get_edges(
            &self,
            address: &str,
            chain: &str,
            direction: Direction,
            min_value: f64,
        ) -> AnalysisResult<Vec<TxEdge>> {
            if address == self.fail_for {
                return Err(AnalysisError::LedgerUnavailable("node down".to_string()));
            }
            self.inner.get_edges(address, chain, direction, min_value).await
        }

        async fn get_transaction(&self, tx_hash: &str) -> AnalysisResult<TxEdge> {
            self.inner.get_transaction(tx_hash).await
        }
    }

    #[tokio::test]
    async fn test_ledger_outage_yields_partial_graph() {
        let ledger = Arc::new(FlakyLedger {
            inner: StaticLedger::new("ethereum", chain_edges()),
            fail_for: "0xbb".to_string(),
        });
        let builder = GraphBuilder::new(ledger);
        let params = ExpansionParams {
            max_depth: 4,
            ..ExpansionParams::default()
        };

        let graph = builder.expand("0xaa", &params).await.unwrap();
        assert!(graph.is_truncated());
        assert!(graph.contains_address("0xbb"));
        // Nothing beyond the failing frontier address was reached.
        assert!(!graph.contains_address("0xcc"));
    }

    #[tokio::test]
    async fn test_invalid_seed_rejected() {
        let ledger = Arc::new(StaticLedger::new("ethereum", vec![]));
        let builder = GraphBuilder::new(ledger);
        let result = builder.expand("0xzz", &ExpansionParams::default()).await;
        assert!(matches!(result, Err(AnalysisError::InvalidAddress(_))));
    }

    #[test]
    fn test_service_edge_kinds() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xaa",
            "ethereum",
            vec![TxEdge::new("0x01", "0xaa", "0xbb", 5.0, t).with_kind(EdgeKind::Mixer)],
        );
        assert!(graph.edges_sorted()[0].kind.is_service());
    }
}

// src/pathfinding/shortest.rs
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::graph::TransactionGraph;
use crate::types::TxEdge;

use super::{path_from_edges, PathQuery, PathfindingResult};

#[derive(Clone)]
struct PathState {
    cost: f64,
    completed_at: DateTime<Utc>,
    edges: Vec<TxEdge>,
}

impl PathState {
    /// Lexicographic preference: value-weighted cost, then earliest
    /// completion, then tx-hash sequence. Hop count is handled by the
    /// level-by-level search.
    fn better_than(&self, other: &PathState) -> bool {
        match self.cost.partial_cmp(&other.cost) {
            Some(std::cmp::Ordering::Less) => return true,
            Some(std::cmp::Ordering::Greater) => return false,
            _ => {}
        }
        match self.completed_at.cmp(&other.completed_at) {
            std::cmp::Ordering::Less => return true,
            std::cmp::Ordering::Greater => return false,
            std::cmp::Ordering::Equal => {}
        }
        let mine = self.edges.iter().map(|e| e.tx_hash.as_str());
        let theirs = other.edges.iter().map(|e| e.tx_hash.as_str());
        mine.lt(theirs)
    }
}

/// Edge cost falls as value rises: tracing prefers the corridor most of
/// the funds actually moved through.
fn edge_cost(edge: &TxEdge) -> f64 {
    1.0 / (1.0 + edge.value.max(0.0))
}

/// Minimal-hop cheapest path via level-synchronous relaxation. Each BFS
/// level settles the nodes first reached at that hop count, so the first
/// level containing the target holds the minimal-hop optimum.
pub(crate) fn run(graph: &TransactionGraph, query: &PathQuery) -> PathfindingResult {
    let mut result = PathfindingResult::empty(query.algorithm);
    let (Some(source), Some(target)) = (query.source.as_deref(), query.target.as_deref())
    else {
        return result;
    };
    if !graph.contains_address(source) || !graph.contains_address(target) {
        return result;
    }

    let mut visited: HashSet<String> = HashSet::from([source.to_string()]);
    let mut frontier: BTreeMap<String, PathState> = BTreeMap::from([(
        source.to_string(),
        PathState {
            cost: 0.0,
            completed_at: DateTime::<Utc>::MIN_UTC,
            edges: Vec::new(),
        },
    )]);

    for _hop in 1..=query.max_hops {
        let mut next: BTreeMap<String, PathState> = BTreeMap::new();

        for (node, state) in &frontier {
            for edge in graph.edges_from(node) {
                if visited.contains(&edge.to) {
                    continue;
                }
                let mut edges = state.edges.clone();
                edges.push(edge.clone());
                let candidate = PathState {
                    cost: state.cost + edge_cost(edge),
                    completed_at: edge.timestamp,
                    edges,
                };
                match next.get(&edge.to) {
                    Some(existing) if !candidate.better_than(existing) => {}
                    _ => {
                        next.insert(edge.to.clone(), candidate);
                    }
                }
            }
        }

        if let Some(state) = next.get(target) {
            result
                .paths
                .push(path_from_edges(state.edges.clone(), query.algorithm));
            return result;
        }

        visited.extend(next.keys().cloned());
        frontier = next;
        if frontier.is_empty() {
            // Graph exhausted: the target is unreachable, not budgeted out.
            return result;
        }
    }

    result.budget_exceeded = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::PathAlgorithm;
    use chrono::Duration;

    fn diamond_graph() -> TransactionGraph {
        let t = Utc::now();
        TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                // Two 2-hop routes; the upper one carries more value.
                TxEdge::new("0x01", "0xa", "0xb", 100.0, t),
                TxEdge::new("0x02", "0xb", "0xz", 95.0, t + Duration::minutes(1)),
                TxEdge::new("0x03", "0xa", "0xc", 5.0, t),
                TxEdge::new("0x04", "0xc", "0xz", 4.0, t + Duration::minutes(1)),
                // A 1-hop route exists too.
                TxEdge::new("0x05", "0xa", "0xz", 1.0, t + Duration::minutes(2)),
            ],
        )
    }

    fn query(source: &str, target: &str, max_hops: usize) -> PathQuery {
        PathQuery::between(PathAlgorithm::Shortest, source, target).with_max_hops(max_hops)
    }

    #[test]
    fn test_fewest_hops_wins_over_value() {
        let graph = diamond_graph();
        let result = run(&graph, &query("0xa", "0xz", 6));

        assert_eq!(result.paths.len(), 1);
        let path = &result.paths[0];
        assert_eq!(path.hops, 1);
        assert_eq!(path.edges[0].tx_hash, "0x05");
        assert!(!result.budget_exceeded);
    }

    #[test]
    fn test_value_breaks_equal_hop_ties() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xb", 100.0, t),
                TxEdge::new("0x02", "0xb", "0xz", 95.0, t + Duration::minutes(1)),
                TxEdge::new("0x03", "0xa", "0xc", 5.0, t),
                TxEdge::new("0x04", "0xc", "0xz", 4.0, t + Duration::minutes(1)),
            ],
        );
        let result = run(&graph, &query("0xa", "0xz", 6));

        assert_eq!(result.paths.len(), 1);
        let hashes: Vec<&str> = result.paths[0]
            .edges
            .iter()
            .map(|e| e.tx_hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["0x01", "0x02"]);
    }

    #[test]
    fn test_hop_budget_flags_not_errors() {
        let t = Utc::now();
        // Only a 3-hop route exists.
        let graph = TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xb", 10.0, t),
                TxEdge::new("0x02", "0xb", "0xc", 10.0, t),
                TxEdge::new("0x03", "0xc", "0xz", 10.0, t),
            ],
        );
        let result = run(&graph, &query("0xa", "0xz", 2));

        assert!(result.paths.is_empty());
        assert!(result.budget_exceeded);
    }

    #[test]
    fn test_unreachable_target_is_not_budget() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xb", 10.0, t),
                // 0xz only ever sends, so nothing reaches it.
                TxEdge::new("0x02", "0xz", "0xq", 10.0, t),
            ],
        );
        let result = run(&graph, &query("0xa", "0xz", 6));

        assert!(result.paths.is_empty());
        assert!(!result.budget_exceeded);
    }

    #[test]
    fn test_cycles_do_not_hang() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xb", 10.0, t),
                TxEdge::new("0x02", "0xb", "0xa", 10.0, t),
                TxEdge::new("0x03", "0xb", "0xz", 10.0, t),
            ],
        );
        let result = run(&graph, &query("0xa", "0xz", 8));
        assert_eq!(result.paths.len(), 1);
        assert_eq!(result.paths[0].hops, 2);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let graph = diamond_graph();
        let q = query("0xa", "0xz", 6);
        let first = run(&graph, &q);
        let second = run(&graph, &q);

        let hashes = |r: &PathfindingResult| {
            r.paths
                .iter()
                .flat_map(|p| p.edges.iter().map(|e| e.tx_hash.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(hashes(&first), hashes(&second));
    }
}

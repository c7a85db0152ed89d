// src/pathfinding/components.rs
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::TransactionGraph;

use super::{PathQuery, PathfindingResult};

/// One weakly-connected partition of the expanded graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: usize,
    pub addresses: Vec<String>,
    pub edge_count: usize,
    pub total_value: f64,
}

/// Partition the graph into weakly-connected components, ignoring edge
/// direction, largest first.
pub(crate) fn run(graph: &TransactionGraph, query: &PathQuery) -> PathfindingResult {
    let mut result = PathfindingResult::empty(query.algorithm);
    let inner = graph.inner();

    let mut visited: HashSet<String> = HashSet::new();
    let mut components: Vec<Vec<String>> = Vec::new();

    for address in graph.addresses() {
        if visited.contains(address) {
            continue;
        }
        let Some(start) = graph.node_index(address) else {
            continue;
        };

        let mut members = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            let Some(info) = inner.node_weight(node) else {
                continue;
            };
            if !visited.insert(info.address.clone()) {
                continue;
            }
            members.push(info.address.clone());

            for edge in inner.edges_directed(node, petgraph::Direction::Outgoing) {
                stack.push(edge.target());
            }
            for edge in inner.edges_directed(node, petgraph::Direction::Incoming) {
                stack.push(edge.source());
            }
        }

        members.sort_unstable();
        components.push(members);
    }

    components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
    if components.len() > query.max_results {
        components.truncate(query.max_results);
        result.budget_exceeded = true;
    }

    result.components = components
        .into_iter()
        .enumerate()
        .map(|(id, addresses)| {
            let member_set: HashSet<&str> = addresses.iter().map(|s| s.as_str()).collect();
            let edges: Vec<_> = graph
                .edges_sorted()
                .into_iter()
                .filter(|e| member_set.contains(e.from.as_str()))
                .collect();
            Component {
                id,
                edge_count: edges.len(),
                total_value: edges.iter().map(|e| e.value).sum(),
                addresses,
            }
        })
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::PathAlgorithm;
    use crate::types::TxEdge;
    use chrono::Utc;

    fn two_island_graph() -> TransactionGraph {
        let t = Utc::now();
        TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xb", 10.0, t),
                TxEdge::new("0x02", "0xb", "0xc", 9.0, t),
                TxEdge::new("0x03", "0xx", "0xy", 5.0, t),
            ],
        )
    }

    #[test]
    fn test_partitions_islands() {
        let graph = two_island_graph();
        let result = run(&graph, &PathQuery::new(PathAlgorithm::Components));

        assert_eq!(result.components.len(), 2);
        assert_eq!(result.components[0].addresses, vec!["0xa", "0xb", "0xc"]);
        assert_eq!(result.components[1].addresses, vec!["0xx", "0xy"]);
        assert_eq!(result.components[0].edge_count, 2);
        assert_eq!(result.components[1].total_value, 5.0);
    }

    #[test]
    fn test_direction_is_ignored_for_membership() {
        let t = Utc::now();
        // 0xc only receives; it still belongs to the weak component.
        let graph = TransactionGraph::from_edges(
            "0xa",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa", "0xc", 10.0, t),
                TxEdge::new("0x02", "0xb", "0xc", 10.0, t),
            ],
        );
        let result = run(&graph, &PathQuery::new(PathAlgorithm::Components));
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].addresses.len(), 3);
    }

    #[test]
    fn test_result_cap() {
        let graph = two_island_graph();
        let result = run(
            &graph,
            &PathQuery::new(PathAlgorithm::Components).with_max_results(1),
        );
        assert_eq!(result.components.len(), 1);
        assert!(result.budget_exceeded);
        // Largest component survives the cap.
        assert_eq!(result.components[0].addresses.len(), 3);
    }
}

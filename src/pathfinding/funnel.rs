// src/pathfinding/funnel.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::graph::TransactionGraph;
use crate::types::TxEdge;

use super::{PathQuery, PathfindingResult};

/// A convergence point: many distinct senders paying one sink inside a
/// window. The converging edges are kept as evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funnel {
    pub sink: String,
    pub distinct_sources: usize,
    /// Seconds between the first and last converging transfer.
    pub span_secs: i64,
    pub total_value: f64,
    pub edges: Vec<TxEdge>,
}

/// Scan every node's inbound edges for the densest convergence window.
pub(crate) fn run(graph: &TransactionGraph, query: &PathQuery) -> PathfindingResult {
    let mut result = PathfindingResult::empty(query.algorithm);
    let mut funnels = Vec::new();

    for sink in graph.addresses() {
        let inbound = graph.edges_to(sink);
        if let Some(funnel) = best_window(sink, &inbound, query) {
            funnels.push(funnel);
        }
    }

    funnels.sort_by(|a, b| {
        b.distinct_sources
            .cmp(&a.distinct_sources)
            .then_with(|| a.sink.cmp(&b.sink))
    });
    if funnels.len() > query.max_results {
        funnels.truncate(query.max_results);
        result.budget_exceeded = true;
    }

    result.funnels = funnels;
    result
}

fn best_window(sink: &str, inbound: &[&TxEdge], query: &PathQuery) -> Option<Funnel> {
    let mut best: Option<(usize, usize, usize)> = None; // (distinct, start, end)

    for start in 0..inbound.len() {
        let mut end = start;
        while end < inbound.len()
            && (inbound[end].timestamp - inbound[start].timestamp).num_seconds()
                <= query.window_secs
        {
            end += 1;
        }
        let distinct: HashSet<&str> =
            inbound[start..end].iter().map(|e| e.from.as_str()).collect();
        if distinct.len() >= query.min_in_degree
            && best.map_or(true, |(d, _, _)| distinct.len() > d)
        {
            best = Some((distinct.len(), start, end));
        }
    }

    let (distinct, start, end) = best?;
    let window = &inbound[start..end];
    Some(Funnel {
        sink: sink.to_string(),
        distinct_sources: distinct,
        span_secs: (window[window.len() - 1].timestamp - window[0].timestamp).num_seconds(),
        total_value: window.iter().map(|e| e.value).sum(),
        edges: window.iter().map(|&e| e.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::PathAlgorithm;
    use chrono::{Duration, Utc};

    fn fan_in_graph(senders: usize, gap_secs: i64) -> TransactionGraph {
        let t = Utc::now();
        let edges = (0..senders)
            .map(|i| {
                TxEdge::new(
                    format!("0x{:02}", i),
                    format!("0xw{}", i),
                    "0xsink",
                    10.0,
                    t + Duration::seconds(gap_secs * i as i64),
                )
            })
            .collect();
        TransactionGraph::from_edges("0xsink", "ethereum", edges)
    }

    #[test]
    fn test_convergence_detected() {
        let graph = fan_in_graph(6, 60);
        let query = PathQuery::new(PathAlgorithm::Funnel);
        let result = run(&graph, &query);

        assert_eq!(result.funnels.len(), 1);
        let f = &result.funnels[0];
        assert_eq!(f.sink, "0xsink");
        assert_eq!(f.distinct_sources, 6);
        assert_eq!(f.edges.len(), 6);
        assert_eq!(f.total_value, 60.0);
    }

    #[test]
    fn test_sparse_inflow_ignored() {
        // Six senders but hours apart; no window holds enough of them.
        let graph = fan_in_graph(6, 7200);
        let query = PathQuery::new(PathAlgorithm::Funnel);
        let result = run(&graph, &query);
        assert!(result.funnels.is_empty());
        assert!(!result.budget_exceeded);
    }

    #[test]
    fn test_below_degree_threshold_ignored() {
        let graph = fan_in_graph(3, 60);
        let query = PathQuery::new(PathAlgorithm::Funnel);
        let result = run(&graph, &query);
        assert!(result.funnels.is_empty());
    }

    #[test]
    fn test_result_cap_flags_budget() {
        let t = Utc::now();
        let mut edges = Vec::new();
        for sink in 0..3 {
            for i in 0..5 {
                edges.push(TxEdge::new(
                    format!("0x{}{:02}", sink, i),
                    format!("0xw{}", i),
                    format!("0xsink{}", sink),
                    10.0,
                    t + Duration::seconds(i as i64),
                ));
            }
        }
        let graph = TransactionGraph::from_edges("0xsink0", "ethereum", edges);

        let query = PathQuery::new(PathAlgorithm::Funnel).with_max_results(2);
        let result = run(&graph, &query);
        assert_eq!(result.funnels.len(), 2);
        assert!(result.budget_exceeded);
    }
}

// src/pathfinding/all_paths.rs
use std::collections::HashSet;

use crate::graph::TransactionGraph;
use crate::types::TxEdge;

use super::{path_from_edges, PathQuery, PathfindingResult};

struct Search<'g> {
    graph: &'g TransactionGraph,
    target: &'g str,
    max_hops: usize,
    max_results: usize,
    paths: Vec<Vec<TxEdge>>,
    hop_limited: bool,
    result_capped: bool,
}

impl<'g> Search<'g> {
    /// Depth-first enumeration with per-path visited-edge tracking, so
    /// cycles are walkable but never looped. Paths stop at the target.
    fn dfs(&mut self, current: &str, walk: &mut Vec<TxEdge>, used: &mut HashSet<String>) {
        if self.result_capped {
            return;
        }
        for edge in self.graph.edges_from(current) {
            if used.contains(&edge.tx_hash) {
                continue;
            }
            if walk.len() + 1 > self.max_hops {
                self.hop_limited = true;
                return;
            }
            if edge.to == self.target {
                if self.paths.len() >= self.max_results {
                    self.result_capped = true;
                    return;
                }
                let mut found = walk.clone();
                found.push(edge.clone());
                self.paths.push(found);
                continue;
            }

            used.insert(edge.tx_hash.clone());
            walk.push(edge.clone());
            self.dfs(edge.to.as_str(), walk, used);
            if let Some(e) = walk.pop() {
                used.remove(&e.tx_hash);
            }
        }
    }
}

/// Enumerate every distinct edge walk from source to target within the
/// hop budget, capped at `max_results`.
pub(crate) fn run(graph: &TransactionGraph, query: &PathQuery) -> PathfindingResult {
    let mut result = PathfindingResult::empty(query.algorithm);
    let (Some(source), Some(target)) = (query.source.as_deref(), query.target.as_deref())
    else {
        return result;
    };
    if !graph.contains_address(source) || !graph.contains_address(target) {
        return result;
    }

    let mut search = Search {
        graph,
        target,
        max_hops: query.max_hops,
        max_results: query.max_results,
        paths: Vec::new(),
        hop_limited: false,
        result_capped: false,
    };
    search.dfs(source, &mut Vec::new(), &mut HashSet::new());

    let mut paths = search.paths;
    paths.sort_by(|a, b| {
        a.len().cmp(&b.len()).then_with(|| {
            let ah: Vec<&str> = a.iter().map(|e| e.tx_hash.as_str()).collect();
            let bh: Vec<&str> = b.iter().map(|e| e.tx_hash.as_str()).collect();
            ah.cmp(&bh)
        })
    });

    result.paths = paths
        .into_iter()
        .map(|edges| path_from_edges(edges, query.algorithm))
        .collect();
    result.budget_exceeded = search.hop_limited || search.result_capped;
    result
}

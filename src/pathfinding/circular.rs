// src/pathfinding/circular.rs
use std::collections::HashSet;

use crate::graph::TransactionGraph;
use crate::types::TxEdge;

use super::{path_from_edges, PathQuery, PathfindingResult};

struct Search<'g> {
    graph: &'g TransactionGraph,
    origin: &'g str,
    max_hops: usize,
    max_results: usize,
    cycles: Vec<Vec<TxEdge>>,
    hop_limited: bool,
    result_capped: bool,
}

impl<'g> Search<'g> {
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
            if edge.to == self.origin {
                if self.cycles.len() >= self.max_results {
                    self.result_capped = true;
                    return;
                }
                let mut cycle = walk.clone();
                cycle.push(edge.clone());
                self.cycles.push(cycle);
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

/// Find round-trips: walks leaving the origin address and returning to it.
/// Edge-level visit tracking keeps cyclic graphs terminating while still
/// allowing revisited intermediate addresses.
pub(crate) fn run(graph: &TransactionGraph, query: &PathQuery) -> PathfindingResult {
    let mut result = PathfindingResult::empty(query.algorithm);
    let Some(origin) = query.source.as_deref() else {
        return result;
    };
    if !graph.contains_address(origin) {
        return result;
    }

    let mut search = Search {
        graph,
        origin,
        max_hops: query.max_hops,
        max_results: query.max_results,
        cycles: Vec::new(),
        hop_limited: false,
        result_capped: false,
    };
    search.dfs(origin, &mut Vec::new(), &mut HashSet::new());

    let mut cycles = search.cycles;
    cycles.sort_by(|a, b| {
        a.len().cmp(&b.len()).then_with(|| {
            let ah: Vec<&str> = a.iter().map(|e| e.tx_hash.as_str()).collect();
            let bh: Vec<&str> = b.iter().map(|e| e.tx_hash.as_str()).collect();
            ah.cmp(&bh)
        })
    });

    result.paths = cycles
        .into_iter()
        .map(|edges| path_from_edges(edges, query.algorithm))
        .collect();
    result.budget_exceeded = search.hop_limited || search.result_capped;
    result
}

// src/patterns/synchronized.rs
use std::collections::HashSet;

use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{PatternMatch, PatternType, TxEdge};

use super::config::SynchronizedConfig;

/// Detect synchronized transfers: several distinct addresses moving funds
/// to or from one shared counterparty inside a tight window. Reported per
/// counterparty, once for the inbound side and once for the outbound side.
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &SynchronizedConfig,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    for hub in graph.addresses() {
        if let Some(m) = best_window(hub, &graph.edges_to(hub), true, cfg)? {
            matches.push(m);
        }
        if let Some(m) = best_window(hub, &graph.edges_from(hub), false, cfg)? {
            matches.push(m);
        }
    }

    Ok(matches)
}

/// Slide a `max_delta` window over the hub's edges and keep the window with
/// the most distinct counterparties; earliest window wins ties.
fn best_window(
    hub: &str,
    edges: &[&TxEdge],
    inbound: bool,
    cfg: &SynchronizedConfig,
) -> AnalysisResult<Option<PatternMatch>> {
    fn counterparty(e: &TxEdge, inbound: bool) -> &str {
        if inbound { e.from.as_str() } else { e.to.as_str() }
    }

    let mut best: Option<(usize, usize, usize)> = None; // (distinct, start, end)

    for start in 0..edges.len() {
        let mut end = start;
        while end < edges.len()
            && (edges[end].timestamp - edges[start].timestamp).num_seconds()
                <= cfg.max_delta_secs
        {
            end += 1;
        }
        let distinct: HashSet<&str> =
            edges[start..end].iter().map(|e| counterparty(e, inbound)).collect();
        if distinct.len() >= cfg.min_addresses
            && best.map_or(true, |(d, _, _)| distinct.len() > d)
        {
            best = Some((distinct.len(), start, end));
        }
    }

    let Some((distinct, start, end)) = best else {
        return Ok(None);
    };

    let window = &edges[start..end];
    let span = (window[window.len() - 1].timestamp - window[0].timestamp).num_seconds();
    let tightness = 1.0 - span as f64 / cfg.max_delta_secs as f64;
    let count_signal = (distinct as f64 / cfg.count_saturation).min(1.0);
    let confidence = cfg.count_weight * count_signal + cfg.tightness_weight * tightness;

    let mut participants: Vec<String> =
        window.iter().map(|e| counterparty(e, inbound).to_string()).collect();
    participants.sort_unstable();
    participants.dedup();
    let mut addresses = vec![hub.to_string()];
    addresses.extend(participants);

    Ok(Some(PatternMatch::new(
        PatternType::SynchronizedTransfers,
        confidence,
        window.iter().map(|e| e.tx_hash.clone()).collect(),
        addresses,
        format!(
            "{} distinct addresses {} {} within {}s",
            distinct,
            if inbound { "paid into" } else { "were paid from" },
            hub,
            span
        ),
    )?))
}

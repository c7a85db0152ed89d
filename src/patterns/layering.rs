// src/patterns/layering.rs
use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{PatternMatch, PatternType, TxEdge};

use super::config::LayeringConfig;

/// Detect layering: value forwarded through a run of intermediate
/// addresses inside a short window, losing no more than fees at each hop.
/// Confidence combines intermediate count with time compression.
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &LayeringConfig,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    for head in graph.edges_sorted() {
        if !is_chain_head(graph, head, cfg) {
            continue;
        }

        let chain = extend_chain(graph, head, cfg);
        let intermediates = chain.len().saturating_sub(1);
        if intermediates < cfg.min_intermediates {
            continue;
        }

        let elapsed = (chain[chain.len() - 1].timestamp - chain[0].timestamp).num_seconds();
        let hop_signal = (intermediates as f64 / cfg.hop_saturation).min(1.0);
        let compression = 1.0 - (elapsed as f64 / cfg.window_secs as f64).clamp(0.0, 1.0);
        let confidence = cfg.hop_weight * hop_signal + cfg.speed_weight * compression;

        let evidence: Vec<String> = chain.iter().map(|e| e.tx_hash.clone()).collect();
        let mut addresses: Vec<String> = vec![chain[0].from.clone()];
        addresses.extend(chain.iter().map(|e| e.to.clone()));

        matches.push(PatternMatch::new(
            PatternType::Layering,
            confidence,
            evidence,
            addresses,
            format!(
                "value forwarded through {} intermediates in {}s with <{:.0}% loss per hop",
                intermediates,
                elapsed,
                cfg.fee_tolerance * 100.0
            ),
        )?);
    }

    Ok(matches)
}

fn forwards(prev: &TxEdge, next: &TxEdge, cfg: &LayeringConfig) -> bool {
    next.value <= prev.value && next.value >= prev.value * (1.0 - cfg.fee_tolerance)
}

fn is_chain_head(graph: &TransactionGraph, edge: &TxEdge, cfg: &LayeringConfig) -> bool {
    !graph.edges_to(&edge.from).iter().any(|p| {
        forwards(p, edge, cfg)
            && p.timestamp <= edge.timestamp
            && (edge.timestamp - p.timestamp).num_seconds() <= cfg.window_secs
    })
}

fn extend_chain<'g>(
    graph: &'g TransactionGraph,
    head: &'g TxEdge,
    cfg: &LayeringConfig,
) -> Vec<&'g TxEdge> {
    let mut chain = vec![head];
    let mut seen: std::collections::HashSet<&str> =
        std::collections::HashSet::from([head.tx_hash.as_str()]);

    loop {
        let last = chain[chain.len() - 1];
        let next = graph
            .edges_from(&last.to)
            .into_iter()
            .filter(|e| {
                !seen.contains(e.tx_hash.as_str())
                    && forwards(last, e, cfg)
                    && e.timestamp >= last.timestamp
                    && (e.timestamp - head.timestamp).num_seconds() <= cfg.window_secs
            })
            .min_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.tx_hash.cmp(&b.tx_hash))
            });

        match next {
            Some(edge) => {
                seen.insert(edge.tx_hash.as_str());
                chain.push(edge);
            }
            None => break,
        }
    }

    chain
}

// src/patterns/peeling.rs
use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{PatternMatch, PatternType, TxEdge};

use super::config::PeelingConfig;

/// Detect peeling chains: a run of hops where each address forwards a
/// strictly decreasing residual within the configured window. Confidence
/// combines chain length with how regular the split ratio is.
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &PeelingConfig,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    for head in graph.edges_sorted() {
        if !is_chain_head(graph, head, cfg) {
            continue;
        }

        let chain = extend_chain(graph, head, cfg);
        if chain.len() < cfg.min_hops {
            continue;
        }

        let hops = chain.len();
        let length_signal = (hops as f64 / cfg.length_saturation).min(1.0);
        let regularity = split_regularity(&chain);
        let confidence =
            cfg.length_weight * length_signal + cfg.regularity_weight * regularity;

        let evidence: Vec<String> = chain.iter().map(|e| e.tx_hash.clone()).collect();
        let mut addresses: Vec<String> = vec![chain[0].from.clone()];
        addresses.extend(chain.iter().map(|e| e.to.clone()));

        matches.push(PatternMatch::new(
            PatternType::PeelingChain,
            confidence,
            evidence,
            addresses,
            format!(
                "{} hops of strictly decreasing transfers from {} ({} -> {}), split regularity {:.2}",
                hops,
                chain[0].from,
                chain[0].value,
                chain[hops - 1].value,
                regularity
            ),
        )?);
    }

    Ok(matches)
}

/// An edge starts a chain when no larger transfer feeds its source within
/// the window; interior hops are covered by the head's walk.
fn is_chain_head(graph: &TransactionGraph, edge: &TxEdge, cfg: &PeelingConfig) -> bool {
    !graph.edges_to(&edge.from).iter().any(|p| {
        p.value > edge.value
            && p.timestamp <= edge.timestamp
            && (edge.timestamp - p.timestamp).num_seconds() <= cfg.window_secs
    })
}

fn extend_chain<'g>(
    graph: &'g TransactionGraph,
    head: &'g TxEdge,
    cfg: &PeelingConfig,
) -> Vec<&'g TxEdge> {
    let mut chain = vec![head];

    loop {
        let last = chain[chain.len() - 1];
        let next = graph
            .edges_from(&last.to)
            .into_iter()
            .filter(|e| {
                e.value > 0.0
                    && e.value < last.value
                    && e.timestamp >= last.timestamp
                    && (e.timestamp - head.timestamp).num_seconds() <= cfg.window_secs
            })
            // Follow the dominant outflow; ordering below is deterministic.
            .max_by(|a, b| {
                a.value
                    .partial_cmp(&b.value)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
                    .then_with(|| b.tx_hash.cmp(&a.tx_hash))
            });

        match next {
            Some(edge) => chain.push(edge),
            None => break,
        }
    }

    chain
}

/// 1.0 for perfectly regular split ratios, falling with their coefficient
/// of variation.
fn split_regularity(chain: &[&TxEdge]) -> f64 {
    if chain.len() < 2 {
        return 0.0;
    }
    let ratios: Vec<f64> = chain
        .windows(2)
        .map(|pair| pair[1].value / pair[0].value)
        .collect();
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance =
        ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / ratios.len() as f64;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}

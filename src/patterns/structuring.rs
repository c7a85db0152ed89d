// src/patterns/structuring.rs
use std::collections::BTreeMap;

use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{PatternMatch, PatternType, TxEdge};

use super::config::StructuringConfig;

/// Detect structuring: per source address, clusters of outgoing amounts
/// sitting just under the reporting threshold, and clusters of suspiciously
/// round amounts.
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &StructuringConfig,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    // BTreeMap keeps source iteration order stable across runs.
    let mut by_source: BTreeMap<&str, Vec<&TxEdge>> = BTreeMap::new();
    for edge in graph.edges_sorted() {
        by_source.entry(edge.from.as_str()).or_default().push(edge);
    }

    for (source, edges) in by_source {
        if let Some(m) = sub_threshold_cluster(source, &edges, cfg)? {
            matches.push(m);
        }
        if let Some(m) = round_amount_cluster(source, &edges, cfg)? {
            matches.push(m);
        }
    }

    Ok(matches)
}

fn sub_threshold_cluster(
    source: &str,
    edges: &[&TxEdge],
    cfg: &StructuringConfig,
) -> AnalysisResult<Option<PatternMatch>> {
    let floor = cfg.reporting_threshold * (1.0 - cfg.threshold_margin);
    let clustered: Vec<&&TxEdge> = edges
        .iter()
        .filter(|e| e.value >= floor && e.value < cfg.reporting_threshold)
        .collect();

    if clustered.len() < cfg.min_cluster {
        return Ok(None);
    }

    let band = cfg.reporting_threshold - floor;
    let closeness: f64 = clustered
        .iter()
        .map(|e| (e.value - floor) / band)
        .sum::<f64>()
        / clustered.len() as f64;
    let count_signal = (clustered.len() as f64 / cfg.count_saturation).min(1.0);
    let confidence = cfg.count_weight * count_signal + cfg.closeness_weight * closeness;

    Ok(Some(PatternMatch::new(
        PatternType::Structuring,
        confidence,
        clustered.iter().map(|e| e.tx_hash.clone()).collect(),
        vec![source.to_string()],
        format!(
            "{} transfers from {} within {:.0}% under the {:.0} reporting threshold",
            clustered.len(),
            source,
            cfg.threshold_margin * 100.0,
            cfg.reporting_threshold
        ),
    )?))
}

fn round_amount_cluster(
    source: &str,
    edges: &[&TxEdge],
    cfg: &StructuringConfig,
) -> AnalysisResult<Option<PatternMatch>> {
    let tolerance = cfg.round_unit * cfg.round_tolerance;
    let clustered: Vec<(&&TxEdge, f64)> = edges
        .iter()
        .filter(|e| e.value >= cfg.round_unit)
        .filter_map(|e| {
            let nearest = (e.value / cfg.round_unit).round() * cfg.round_unit;
            let distance = (e.value - nearest).abs();
            (nearest > 0.0 && distance <= tolerance).then_some((e, distance))
        })
        .collect();

    if clustered.len() < cfg.min_cluster {
        return Ok(None);
    }

    let roundness: f64 = clustered
        .iter()
        .map(|(_, d)| 1.0 - d / tolerance)
        .sum::<f64>()
        / clustered.len() as f64;
    let count_signal = (clustered.len() as f64 / cfg.count_saturation).min(1.0);
    let confidence = cfg.count_weight * count_signal + cfg.closeness_weight * roundness;

    Ok(Some(PatternMatch::new(
        PatternType::Structuring,
        confidence,
        clustered.iter().map(|(e, _)| e.tx_hash.clone()).collect(),
        vec![source.to_string()],
        format!(
            "{} round-amount transfers from {} (multiples of {:.0})",
            clustered.len(),
            source,
            cfg.round_unit
        ),
    )?))
}

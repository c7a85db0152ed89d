// src/patterns/timing.rs
use chrono::Timelike;

use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{PatternMatch, PatternType, TxEdge};

use super::config::TimingConfig;

/// Detect off-peak activity: transactions landing in hours that are rare
/// for that address's own historical distribution. Addresses without
/// enough history have no baseline and are skipped.
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &TimingConfig,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    for address in graph.addresses() {
        let mut edges: Vec<&TxEdge> = graph.edges_from(address);
        edges.extend(graph.edges_to(address));
        edges.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        edges.dedup_by(|a, b| a.tx_hash == b.tx_hash);

        if edges.len() < cfg.min_history {
            continue;
        }

        let mut histogram = [0usize; 24];
        for edge in &edges {
            histogram[edge.timestamp.hour() as usize] += 1;
        }
        let total = edges.len() as f64;

        let flagged: Vec<&&TxEdge> = edges
            .iter()
            .filter(|e| {
                let freq = histogram[e.timestamp.hour() as usize] as f64 / total;
                freq < cfg.low_frequency_threshold
            })
            .collect();

        if flagged.len() < cfg.min_flagged {
            continue;
        }

        let avg_freq: f64 = flagged
            .iter()
            .map(|e| histogram[e.timestamp.hour() as usize] as f64 / total)
            .sum::<f64>()
            / flagged.len() as f64;
        let rarity = (1.0 - avg_freq / cfg.low_frequency_threshold).clamp(0.0, 1.0);
        let volume_signal = (flagged.len() as f64 / cfg.flagged_saturation).min(1.0);
        let confidence = cfg.rarity_weight * rarity + cfg.volume_weight * volume_signal;

        let hours: Vec<u32> = {
            let mut hs: Vec<u32> = flagged.iter().map(|e| e.timestamp.hour()).collect();
            hs.sort_unstable();
            hs.dedup();
            hs
        };

        matches.push(PatternMatch::new(
            PatternType::OffPeakActivity,
            confidence,
            flagged.iter().map(|e| e.tx_hash.clone()).collect(),
            vec![address.to_string()],
            format!(
                "{} transactions for {} in historically quiet hours {:?}",
                flagged.len(),
                address,
                hours
            ),
        )?);
    }

    Ok(matches)
}

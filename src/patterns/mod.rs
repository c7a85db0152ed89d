// src/patterns/mod.rs
pub mod config;
mod layering;
mod peeling;
mod services;
mod structuring;
mod synchronized;
mod timing;

pub use config::PatternWeights;
pub use services::{ServiceEntry, ServiceRegistry};

use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::graph::TransactionGraph;
use crate::types::{DetectionReport, PatternMatch};

/// Runs the matcher library over a graph. Matchers are independent: one
/// failing is recorded as a degraded component and the rest still report.
pub struct PatternEngine {
    weights: PatternWeights,
    registry: ServiceRegistry,
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternEngine {
    pub fn new() -> Self {
        Self {
            weights: PatternWeights::default(),
            registry: ServiceRegistry::new(),
        }
    }

    pub fn with_weights(weights: PatternWeights) -> Self {
        Self {
            weights,
            registry: ServiceRegistry::new(),
        }
    }

    pub fn set_registry(&mut self, registry: ServiceRegistry) {
        self.registry = registry;
    }

    pub fn weights(&self) -> &PatternWeights {
        &self.weights
    }

    /// Run every matcher over the graph and assemble one report.
    pub fn detect(&self, graph: &TransactionGraph) -> DetectionReport {
        let started_at = Utc::now();
        let timer = Instant::now();

        let runs: Vec<(&'static str, crate::error::AnalysisResult<Vec<PatternMatch>>)> = vec![
            ("peeling_chain", peeling::detect(graph, &self.weights.peeling)),
            ("layering", layering::detect(graph, &self.weights.layering)),
            (
                "structuring",
                structuring::detect(graph, &self.weights.structuring),
            ),
            (
                "synchronized_transfers",
                synchronized::detect(graph, &self.weights.synchronized),
            ),
            (
                "service_hopping",
                services::detect(graph, &self.weights.services, &self.registry),
            ),
            ("off_peak_activity", timing::detect(graph, &self.weights.timing)),
        ];

        let mut matches = Vec::new();
        let mut degraded = Vec::new();
        for (name, result) in runs {
            match result {
                Ok(found) => {
                    debug!(matcher = name, count = found.len(), "matcher finished");
                    matches.extend(found);
                }
                Err(e) => {
                    warn!(matcher = name, error = %e, "matcher failed, continuing");
                    degraded.push(name.to_string());
                }
            }
        }

        // Evidence is mandatory for audit use; a match without it never
        // leaves the engine.
        matches.retain(|m| {
            if m.evidence.is_empty() {
                warn!(pattern = %m.pattern_type, "dropping match with empty evidence");
                return false;
            }
            true
        });

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pattern_type.as_str().cmp(b.pattern_type.as_str()))
                .then_with(|| a.evidence.cmp(&b.evidence))
        });

        DetectionReport {
            report_id: Uuid::new_v4(),
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
            matches,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PatternType, TxEdge};
    use chrono::Duration;

    fn layered_peel_graph() -> TransactionGraph {
        let t = Utc::now();
        TransactionGraph::from_edges(
            "0xa0",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa0", "0xa1", 100.0, t),
                TxEdge::new("0x02", "0xa1", "0xa2", 60.0, t + Duration::minutes(10)),
                TxEdge::new("0x03", "0xa2", "0xa3", 35.0, t + Duration::minutes(20)),
            ],
        )
    }

    #[test]
    fn test_detect_produces_report() {
        let engine = PatternEngine::new();
        let report = engine.detect(&layered_peel_graph());

        assert!(report.degraded.is_empty());
        assert!(report
            .matches
            .iter()
            .any(|m| m.pattern_type == PatternType::PeelingChain));
        // Ordered by confidence, strongest first.
        for pair in report.matches.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_all_evidence_refers_to_graph() {
        let engine = PatternEngine::new();
        let graph = layered_peel_graph();
        let report = engine.detect(&graph);

        for m in &report.matches {
            assert!(!m.evidence.is_empty());
            for hash in &m.evidence {
                assert!(graph.contains_tx(hash));
            }
        }
    }

    #[test]
    fn test_empty_graph_is_clean() {
        let engine = PatternEngine::new();
        let graph = TransactionGraph::new("0xa0", "ethereum");
        let report = engine.detect(&graph);

        assert!(report.matches.is_empty());
        assert!(report.degraded.is_empty());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let engine = PatternEngine::new();
        let graph = layered_peel_graph();

        let a = engine.detect(&graph);
        let b = engine.detect(&graph);

        let keys = |r: &DetectionReport| {
            r.matches
                .iter()
                .map(|m| (m.pattern_type, m.evidence.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&a), keys(&b));
    }
}

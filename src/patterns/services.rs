// src/patterns/services.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AnalysisResult;
use crate::graph::TransactionGraph;
use crate::types::{EdgeKind, PatternMatch, PatternType, TxEdge};

use super::config::ServiceHopConfig;

/// A known obfuscation/conversion service address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub kind: EdgeKind,
}

/// Registry of known mixer/bridge/DEX addresses, keyed by address.
/// Populated by the deployment; edge kinds reported by the ledger are
/// honored even for unregistered addresses.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: impl Into<String>, name: impl Into<String>, kind: EdgeKind) {
        self.entries.insert(
            address.into(),
            ServiceEntry {
                name: name.into(),
                kind,
            },
        );
    }

    pub fn lookup(&self, address: &str) -> Option<&ServiceEntry> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effective service kind of an edge: the ledger's tag, or the
    /// registry entry of either endpoint.
    pub fn service_kind(&self, edge: &TxEdge) -> Option<EdgeKind> {
        if edge.kind.is_service() {
            return Some(edge.kind);
        }
        self.entries
            .get(&edge.to)
            .or_else(|| self.entries.get(&edge.from))
            .map(|entry| entry.kind)
    }
}

fn kind_severity(kind: EdgeKind) -> f64 {
    match kind {
        EdgeKind::Mixer => 1.0,
        EdgeKind::Bridge => 0.7,
        EdgeKind::Dex => 0.5,
        EdgeKind::Transfer => 0.0,
    }
}

/// Detect service hopping: consecutive routing through mixers, bridges and
/// DEXes. Confidence combines sequence length with how severe the service
/// kinds are (mixers weigh heaviest).
pub(crate) fn detect(
    graph: &TransactionGraph,
    cfg: &ServiceHopConfig,
    registry: &ServiceRegistry,
) -> AnalysisResult<Vec<PatternMatch>> {
    let mut matches = Vec::new();

    for head in graph.edges_sorted() {
        let Some(head_kind) = registry.service_kind(head) else {
            continue;
        };
        if is_continuation(graph, head, registry) {
            continue;
        }

        let mut sequence: Vec<(&TxEdge, EdgeKind)> = vec![(head, head_kind)];
        let mut seen: std::collections::HashSet<&str> =
            std::collections::HashSet::from([head.tx_hash.as_str()]);
        loop {
            let (last, _) = sequence[sequence.len() - 1];
            let next = graph
                .edges_from(&last.to)
                .into_iter()
                .filter_map(|e| registry.service_kind(e).map(|k| (e, k)))
                .find(|(e, _)| e.timestamp >= last.timestamp && !seen.contains(e.tx_hash.as_str()));
            match next {
                Some((edge, kind)) => {
                    seen.insert(edge.tx_hash.as_str());
                    sequence.push((edge, kind));
                }
                None => break,
            }
        }

        if sequence.len() < cfg.min_sequence {
            continue;
        }

        let length_signal = (sequence.len() as f64 / cfg.sequence_saturation).min(1.0);
        let kind_signal = sequence
            .iter()
            .map(|(_, k)| kind_severity(*k))
            .sum::<f64>()
            / sequence.len() as f64;
        let confidence = cfg.length_weight * length_signal + cfg.kind_weight * kind_signal;

        let route: Vec<&str> = sequence.iter().map(|(_, k)| k.as_str()).collect();
        let mut addresses: Vec<String> = vec![sequence[0].0.from.clone()];
        addresses.extend(sequence.iter().map(|(e, _)| e.to.clone()));

        matches.push(PatternMatch::new(
            PatternType::ServiceHopping,
            confidence,
            sequence.iter().map(|(e, _)| e.tx_hash.clone()).collect(),
            addresses,
            format!("funds routed through services: {}", route.join(" -> ")),
        )?);
    }

    Ok(matches)
}

fn is_continuation(graph: &TransactionGraph, edge: &TxEdge, registry: &ServiceRegistry) -> bool {
    graph
        .edges_to(&edge.from)
        .iter()
        .any(|p| registry.service_kind(p).is_some() && p.timestamp <= edge.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_mixer_then_bridge_detected() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa0",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa0", "0xmix", 50.0, t).with_kind(EdgeKind::Mixer),
                TxEdge::new("0x02", "0xmix", "0xbr", 49.0, t + Duration::minutes(10))
                    .with_kind(EdgeKind::Bridge),
            ],
        );

        let matches = detect(&graph, &ServiceHopConfig::default(), &ServiceRegistry::new())
            .unwrap();
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.pattern_type, PatternType::ServiceHopping);
        assert_eq!(m.evidence, vec!["0x01", "0x02"]);
        assert!(m.explanation.contains("mixer -> bridge"));
    }

    #[test]
    fn test_registry_tags_plain_transfers() {
        let t = Utc::now();
        let mut registry = ServiceRegistry::new();
        registry.insert("0xtornado", "tornado.cash", EdgeKind::Mixer);
        registry.insert("0xuni", "uniswap-router", EdgeKind::Dex);

        let graph = TransactionGraph::from_edges(
            "0xa0",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa0", "0xtornado", 50.0, t),
                TxEdge::new("0x02", "0xtornado", "0xuni", 49.0, t + Duration::minutes(5)),
            ],
        );

        let matches = detect(&graph, &ServiceHopConfig::default(), &registry).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].confidence > 0.3);
    }

    #[test]
    fn test_single_service_hop_ignored() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa0",
            "ethereum",
            vec![TxEdge::new("0x01", "0xa0", "0xmix", 50.0, t).with_kind(EdgeKind::Mixer)],
        );
        let matches =
            detect(&graph, &ServiceHopConfig::default(), &ServiceRegistry::new()).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_plain_transfers_ignored() {
        let t = Utc::now();
        let graph = TransactionGraph::from_edges(
            "0xa0",
            "ethereum",
            vec![
                TxEdge::new("0x01", "0xa0", "0xb0", 50.0, t),
                TxEdge::new("0x02", "0xb0", "0xc0", 49.0, t + Duration::minutes(5)),
            ],
        );
        let matches =
            detect(&graph, &ServiceHopConfig::default(), &ServiceRegistry::new()).unwrap();
        assert!(matches.is_empty());
    }
}

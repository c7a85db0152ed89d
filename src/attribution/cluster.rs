// src/attribution/cluster.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::graph::TransactionGraph;

use super::fusion::FusionConfig;
use super::{AttributionSource, RecordedLabel, SourceKind};

/// Tunable cluster-similarity parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Counterparties two addresses must share to count as peers.
    /// Default 2.
    pub min_shared_counterparties: usize,
    /// Labeled peers agreeing on an entity before a source is emitted.
    /// Default 2.
    pub min_labeled_peers: usize,
    /// Peer count at which the peer signal saturates. Default 5.
    pub peer_saturation: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_shared_counterparties: 2,
            min_labeled_peers: 2,
            peer_saturation: 5.0,
        }
    }
}

fn counterparties<'g>(graph: &'g TransactionGraph, address: &str) -> HashSet<&'g str> {
    let mut set: HashSet<&str> = HashSet::new();
    for edge in graph.edges_from(address) {
        set.insert(edge.to.as_str());
    }
    for edge in graph.edges_to(address) {
        set.insert(edge.from.as_str());
    }
    set.remove(address);
    set
}

/// Infer an attribution source from behavioral similarity: if the address
/// shares enough counterparties with already-labeled addresses agreeing on
/// one entity, it likely belongs to that entity's cluster.
pub(crate) fn derive(
    graph: &TransactionGraph,
    address: &str,
    labels: &HashMap<String, RecordedLabel>,
    cfg: &ClusterConfig,
    fusion: &FusionConfig,
) -> Option<AttributionSource> {
    if !graph.contains_address(address) {
        return None;
    }
    let own = counterparties(graph, address);
    if own.is_empty() {
        return None;
    }

    struct Group<'a> {
        peers: Vec<(&'a str, f64)>,
        entity_type: crate::attribution::registry::EntityType,
    }

    let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();
    for (peer, label) in labels {
        if peer == address || !graph.contains_address(peer) {
            continue;
        }
        let shared = counterparties(graph, peer)
            .intersection(&own)
            .count();
        if shared < cfg.min_shared_counterparties {
            continue;
        }
        let entry = groups
            .entry(label.entity_name.as_str())
            .or_insert_with(|| Group {
                peers: Vec::new(),
                entity_type: label.entity_type,
            });
        entry.peers.push((peer.as_str(), label.confidence));
    }

    let (entity_name, mut group) = groups
        .into_iter()
        .filter(|(_, g)| g.peers.len() >= cfg.min_labeled_peers)
        .max_by(|a, b| {
            a.1.peers
                .len()
                .cmp(&b.1.peers.len())
                .then_with(|| b.0.cmp(a.0))
        })?;

    // Peer order must not depend on label-map iteration order.
    group.peers.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let peer_signal = (group.peers.len() as f64 / cfg.peer_saturation).min(1.0);
    let avg_label_confidence =
        group.peers.iter().map(|(_, c)| c).sum::<f64>() / group.peers.len() as f64;
    let confidence = peer_signal * avg_label_confidence;

    Some(AttributionSource {
        kind: SourceKind::Cluster,
        entity_name: entity_name.to_string(),
        entity_type: group.entity_type,
        confidence,
        reliability_weight: fusion.reliability(SourceKind::Cluster),
        evidence: group
            .peers
            .into_iter()
            .map(|(p, _)| format!("cluster-peer:{}", p))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::registry::EntityType;
    use crate::types::TxEdge;
    use chrono::{Duration, Utc};

    /// The subject and five labeled peers all pay the same two deposit
    /// addresses, the classic shared-deposit exchange fingerprint.
    fn exchange_cluster_graph() -> TransactionGraph {
        let t = Utc::now();
        let mut edges = Vec::new();
        let mut n = 0;
        for payer in ["0xsubj", "0xp1", "0xp2", "0xp3", "0xp4", "0xp5"] {
            for deposit in ["0xdep1", "0xdep2"] {
                n += 1;
                edges.push(TxEdge::new(
                    format!("0x{:03}", n),
                    payer,
                    deposit,
                    10.0,
                    t + Duration::minutes(n as i64),
                ));
            }
        }
        TransactionGraph::from_edges("0xsubj", "ethereum", edges)
    }

    fn exchange_labels() -> HashMap<String, RecordedLabel> {
        ["0xp1", "0xp2", "0xp3", "0xp4", "0xp5"]
            .into_iter()
            .map(|p| {
                (
                    p.to_string(),
                    RecordedLabel {
                        entity_name: "Exchange X".to_string(),
                        entity_type: EntityType::Exchange,
                        confidence: 0.9,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_cluster_source_from_labeled_peers() {
        let graph = exchange_cluster_graph();
        let labels = exchange_labels();

        let source = derive(
            &graph,
            "0xsubj",
            &labels,
            &ClusterConfig::default(),
            &FusionConfig::default(),
        )
        .expect("subject clusters with labeled peers");

        assert_eq!(source.kind, SourceKind::Cluster);
        assert_eq!(source.entity_name, "Exchange X");
        assert_eq!(source.evidence.len(), 5);
        // Five peers saturate the peer signal.
        assert!((source.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_peers_no_source() {
        let graph = exchange_cluster_graph();
        let mut labels = exchange_labels();
        labels.retain(|k, _| k == "0xp1");

        let source = derive(
            &graph,
            "0xsubj",
            &labels,
            &ClusterConfig::default(),
            &FusionConfig::default(),
        );
        assert!(source.is_none());
    }

    #[test]
    fn test_unrelated_peers_no_source() {
        let t = Utc::now();
        // Labeled addresses exist but share nothing with the subject.
        let graph = TransactionGraph::from_edges(
            "0xsubj",
            "ethereum",
            vec![
                TxEdge::new("0x001", "0xsubj", "0xdep1", 10.0, t),
                TxEdge::new("0x002", "0xp1", "0xother1", 10.0, t),
                TxEdge::new("0x003", "0xp2", "0xother2", 10.0, t),
            ],
        );

        let source = derive(
            &graph,
            "0xsubj",
            &exchange_labels(),
            &ClusterConfig::default(),
            &FusionConfig::default(),
        );
        assert!(source.is_none());
    }
}

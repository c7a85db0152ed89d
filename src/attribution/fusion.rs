// src/attribution/fusion.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::registry::EntityType;
use super::{AddressAttribution, AttributionSource, EntityScore, SourceKind};

/// Tunable fusion parameters. Reliability weights express how much each
/// source class is trusted before looking at its per-candidate
/// confidence; the corroboration bonus rewards independent agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Registry exact matches. Default 0.95.
    pub exact_match_weight: f64,
    /// External intelligence feeds. Default 0.75.
    pub external_feed_weight: f64,
    /// Cluster-similarity inference. Default 0.65.
    pub cluster_weight: f64,
    /// Pattern-derived labels. Default 0.50.
    pub pattern_weight: f64,
    /// Added per extra distinct source kind agreeing on the same entity.
    /// Default 0.10.
    pub corroboration_bonus: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            exact_match_weight: 0.95,
            external_feed_weight: 0.75,
            cluster_weight: 0.65,
            pattern_weight: 0.50,
            corroboration_bonus: 0.10,
        }
    }
}

impl FusionConfig {
    pub fn reliability(&self, kind: SourceKind) -> f64 {
        match kind {
            SourceKind::ExactMatch => self.exact_match_weight,
            SourceKind::ExternalFeed => self.external_feed_weight,
            SourceKind::Cluster => self.cluster_weight,
            SourceKind::Pattern => self.pattern_weight,
        }
    }
}

/// Reduce the gathered sources to one fused attribution.
///
/// Per candidate entity: a reliability-weighted average of source
/// confidences, floored at the strongest individual confidence, plus the
/// corroboration bonus per extra agreeing source kind, capped at 1.0. The
/// floor is what keeps fusion monotone: a weak agreeing source can add
/// its bonus but can never drag an established strong source down.
/// Disagreement is never discarded; losing candidates become ranked
/// alternatives.
pub(crate) fn fuse(
    address: &str,
    sources: Vec<AttributionSource>,
    degraded: Vec<String>,
    cfg: &FusionConfig,
) -> AddressAttribution {
    // BTreeMap: candidate iteration must not depend on hash order.
    let mut by_entity: BTreeMap<&str, Vec<&AttributionSource>> = BTreeMap::new();
    for source in &sources {
        by_entity
            .entry(source.entity_name.as_str())
            .or_default()
            .push(source);
    }

    let mut scored: Vec<EntityScore> = by_entity
        .into_iter()
        .map(|(name, group)| {
            let weight_sum: f64 = group.iter().map(|s| s.reliability_weight).sum();
            let weighted_avg = if weight_sum > 0.0 {
                group
                    .iter()
                    .map(|s| s.reliability_weight * s.confidence)
                    .sum::<f64>()
                    / weight_sum
            } else {
                0.0
            };
            let strongest = group
                .iter()
                .map(|s| s.confidence)
                .fold(0.0_f64, f64::max);

            let mut kinds: Vec<SourceKind> = group.iter().map(|s| s.kind).collect();
            kinds.sort_unstable();
            kinds.dedup();
            let bonus = cfg.corroboration_bonus * (kinds.len().saturating_sub(1)) as f64;

            let entity_type = group
                .iter()
                .map(|s| s.entity_type)
                .find(|t| *t != EntityType::Unknown)
                .unwrap_or(EntityType::Unknown);

            EntityScore {
                entity_name: name.to_string(),
                entity_type,
                confidence: (weighted_avg.max(strongest) + bonus).min(1.0),
                source_kinds: kinds,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity_name.cmp(&b.entity_name))
    });

    let winner = scored.first().cloned();
    let alternatives = if scored.is_empty() {
        Vec::new()
    } else {
        scored[1..].to_vec()
    };

    AddressAttribution {
        address: address.to_string(),
        entity_name: winner.as_ref().map(|w| w.entity_name.clone()),
        entity_type: winner
            .as_ref()
            .map(|w| w.entity_type)
            .unwrap_or(EntityType::Unknown),
        confidence: winner.map(|w| w.confidence).unwrap_or(0.0),
        sources,
        alternatives,
        degraded,
    }
}

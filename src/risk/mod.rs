// src/risk/mod.rs
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attribution::{AddressAttribution, EntityType};
use crate::types::{PatternMatch, RiskLevel, Severity};

/// Tunable component weights for risk aggregation. Weights are
/// normalized over the components actually present, so a missing
/// attribution does not deflate the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Pattern-match component. Default 0.5.
    pub pattern_weight: f64,
    /// Attribution entity-risk component. Default 0.2.
    pub attribution_weight: f64,
    /// Mixer/privacy exposure component. Default 0.3.
    pub exposure_weight: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            pattern_weight: 0.5,
            attribution_weight: 0.2,
            exposure_weight: 0.3,
        }
    }
}

/// Everything the aggregator considers for one subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskInputs {
    pub matches: Vec<PatternMatch>,
    pub attribution: Option<AddressAttribution>,
    /// Hard override: a sanctions hit forces maximum risk.
    pub sanctioned: bool,
    pub mixer_exposure: bool,
    pub privacy_tool_usage: bool,
}

/// Combines pattern, attribution and exposure signals into one
/// normalized score.
#[derive(Debug, Clone, Default)]
pub struct RiskAggregator {
    weights: RiskWeights,
}

impl RiskAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// Score in [0, 1], rounded to 4 decimals.
    pub fn score(&self, inputs: &RiskInputs) -> f64 {
        if inputs.sanctioned {
            debug!("sanctions override, forcing maximum risk");
            return 1.0;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        if !inputs.matches.is_empty() {
            weighted_sum += self.weights.pattern_weight * pattern_component(&inputs.matches);
            weight_total += self.weights.pattern_weight;
        }
        if let Some(attribution) = &inputs.attribution {
            weighted_sum +=
                self.weights.attribution_weight * attribution_component(attribution);
            weight_total += self.weights.attribution_weight;
        }
        let exposure = exposure_component(inputs);
        if exposure > 0.0 {
            weighted_sum += self.weights.exposure_weight * exposure;
            weight_total += self.weights.exposure_weight;
        }

        if weight_total == 0.0 {
            return 0.0;
        }
        round4((weighted_sum / weight_total).clamp(0.0, 1.0))
    }

    pub fn level(&self, inputs: &RiskInputs) -> RiskLevel {
        RiskLevel::from_score(self.score(inputs))
    }
}

/// Noisy-or over severity-scaled confidences: every additional match
/// raises the component, strongest matches dominate.
fn pattern_component(matches: &[PatternMatch]) -> f64 {
    let mut clean = 1.0;
    for m in matches {
        clean *= 1.0 - (m.confidence * severity_factor(m.severity)).clamp(0.0, 1.0);
    }
    1.0 - clean
}

fn severity_factor(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.4,
        Severity::Medium => 0.6,
        Severity::High => 0.8,
        Severity::Critical => 0.9,
        Severity::Severe => 1.0,
    }
}

fn attribution_component(attribution: &AddressAttribution) -> f64 {
    let entity_risk = match attribution.entity_type {
        EntityType::Mixer => 1.0,
        EntityType::Bridge => 0.6,
        EntityType::DexProtocol => 0.4,
        EntityType::Unknown => 0.4,
        EntityType::Individual => 0.3,
        EntityType::Merchant => 0.2,
        EntityType::Exchange | EntityType::Custodian => 0.1,
    };
    entity_risk * attribution.confidence.clamp(0.0, 1.0)
}

fn exposure_component(inputs: &RiskInputs) -> f64 {
    match (inputs.mixer_exposure, inputs.privacy_tool_usage) {
        (true, true) => 1.0,
        (true, false) => 0.9,
        (false, true) => 0.7,
        (false, false) => 0.0,
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatternType;

    fn strong_match() -> PatternMatch {
        PatternMatch::new(
            PatternType::Layering,
            0.9,
            vec!["0x01".to_string()],
            vec!["0xaa".to_string()],
            "test match",
        )
        .unwrap()
    }

    #[test]
    fn test_sanctions_override() {
        let aggregator = RiskAggregator::new();
        let inputs = RiskInputs {
            sanctioned: true,
            ..RiskInputs::default()
        };
        assert_eq!(aggregator.score(&inputs), 1.0);
        assert_eq!(aggregator.level(&inputs), RiskLevel::Severe);
    }

    #[test]
    fn test_no_signals_scores_zero() {
        let aggregator = RiskAggregator::new();
        assert_eq!(aggregator.score(&RiskInputs::default()), 0.0);
    }

    #[test]
    fn test_patterns_raise_score() {
        let aggregator = RiskAggregator::new();
        let one = RiskInputs {
            matches: vec![strong_match()],
            ..RiskInputs::default()
        };
        let two = RiskInputs {
            matches: vec![strong_match(), strong_match()],
            ..RiskInputs::default()
        };

        let s1 = aggregator.score(&one);
        let s2 = aggregator.score(&two);
        assert!(s1 > 0.0);
        assert!(s2 > s1);
        assert!(s2 <= 1.0);
    }

    #[test]
    fn test_mixer_exposure_raises_score() {
        let aggregator = RiskAggregator::new();
        let modest = PatternMatch::new(
            PatternType::Structuring,
            0.5,
            vec!["0x02".to_string()],
            vec!["0xaa".to_string()],
            "modest match",
        )
        .unwrap();
        let base = RiskInputs {
            matches: vec![modest.clone()],
            ..RiskInputs::default()
        };
        let exposed = RiskInputs {
            matches: vec![modest],
            mixer_exposure: true,
            ..RiskInputs::default()
        };
        assert!(aggregator.score(&exposed) > aggregator.score(&base));
    }

    #[test]
    fn test_score_is_rounded() {
        let aggregator = RiskAggregator::new();
        let inputs = RiskInputs {
            matches: vec![strong_match()],
            mixer_exposure: true,
            ..RiskInputs::default()
        };
        let score = aggregator.score(&inputs);
        assert_eq!(score, round4(score));
        assert!(score > 0.0 && score <= 1.0);
    }
}

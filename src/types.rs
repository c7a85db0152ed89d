// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AnalysisError, AnalysisResult};

/// Kind of value movement an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Transfer,
    Bridge,
    Dex,
    Mixer,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Transfer => "transfer",
            EdgeKind::Bridge => "bridge",
            EdgeKind::Dex => "dex",
            EdgeKind::Mixer => "mixer",
        }
    }

    /// Whether this edge kind routes through an obfuscation or conversion
    /// service rather than a plain counterparty.
    pub fn is_service(&self) -> bool {
        !matches!(self, EdgeKind::Transfer)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed transaction edge between two addresses, identified by tx hash.
/// Parallel edges between the same pair are expected and preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEdge {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub value: f64,
    pub asset: String,
    pub timestamp: DateTime<Utc>,
    pub block_height: u64,
    pub kind: EdgeKind,
}

impl TxEdge {
    pub fn new(
        tx_hash: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            from: from.into(),
            to: to.into(),
            value,
            asset: "native".to_string(),
            timestamp,
            block_height: 0,
            kind: EdgeKind::Transfer,
        }
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_block(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }
}

/// Per-address state accumulated while a graph is assembled. Labels are
/// discovered hints, not authoritative until fused by attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub chain: String,
    pub total_in: f64,
    pub total_out: f64,
    pub tx_count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
}

impl AddressInfo {
    pub fn new(address: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: chain.into(),
            total_in: 0.0,
            total_out: 0.0,
            tx_count: 0,
            first_seen: None,
            last_seen: None,
            labels: Vec::new(),
        }
    }

    pub fn record_edge(&mut self, value: f64, timestamp: DateTime<Utc>, outgoing: bool) {
        if outgoing {
            self.total_out += value;
        } else {
            self.total_in += value;
        }
        self.tx_count += 1;
        self.first_seen = Some(match self.first_seen {
            Some(t) if t <= timestamp => t,
            _ => timestamp,
        });
        self.last_seen = Some(match self.last_seen {
            Some(t) if t >= timestamp => t,
            _ => timestamp,
        });
    }
}

/// Direction of edge expansion relative to the frontier address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Both => "both",
        }
    }
}

/// Parameters for one graph expansion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionParams {
    pub chain: String,
    pub direction: Direction,
    /// Maximum BFS depth from the seed.
    pub max_depth: u32,
    /// Hard cap on node count; expansion stops and flags truncation beyond it.
    pub node_budget: usize,
    /// Edges below this value are not fetched.
    pub min_value: f64,
    /// Wall-clock budget for the expansion; exceeding it truncates.
    pub time_budget_ms: u64,
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self {
            chain: "ethereum".to_string(),
            direction: Direction::Both,
            max_depth: 3,
            node_budget: 500,
            min_value: 0.0,
            time_budget_ms: 30_000,
        }
    }
}

impl ExpansionParams {
    pub fn validate(&self) -> AnalysisResult<()> {
        validate_chain(&self.chain)?;
        if self.max_depth == 0 {
            return Err(AnalysisError::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.node_budget == 0 {
            return Err(AnalysisError::InvalidParameter(
                "node_budget must be at least 1".to_string(),
            ));
        }
        if self.min_value < 0.0 {
            return Err(AnalysisError::InvalidParameter(
                "min_value must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot statistics for an expanded graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub total_value: f64,
    pub depth_reached: u32,
    pub truncated: bool,
}

/// Heuristic AML patterns this engine can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    PeelingChain,
    Layering,
    Structuring,
    SynchronizedTransfers,
    ServiceHopping,
    OffPeakActivity,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::PeelingChain => "PEELING_CHAIN",
            PatternType::Layering => "LAYERING",
            PatternType::Structuring => "STRUCTURING",
            PatternType::SynchronizedTransfers => "SYNCHRONIZED_TRANSFERS",
            PatternType::ServiceHopping => "SERVICE_HOPPING",
            PatternType::OffPeakActivity => "OFF_PEAK_ACTIVITY",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity band derived from match confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Severe,
}

impl Severity {
    /// Fixed confidence thresholds; severity is a presentation band,
    /// confidence is the tunable quantity.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.2 {
            Severity::Low
        } else if confidence < 0.4 {
            Severity::Medium
        } else if confidence < 0.6 {
            Severity::High
        } else if confidence < 0.8 {
            Severity::Critical
        } else {
            Severity::Severe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
            Severity::Severe => "SEVERE",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One evidence-bearing pattern match. Evidence is the minimal sufficient
/// ordered tx-hash set; a match without evidence is unusable for audit and
/// cannot be constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub severity: Severity,
    /// Ordered tx hashes backing the match.
    pub evidence: Vec<String>,
    /// Addresses involved, in traversal order.
    pub addresses: Vec<String>,
    pub explanation: String,
}

impl PatternMatch {
    /// Build a match, clamping confidence and deriving severity.
    /// Rejects empty evidence.
    pub fn new(
        pattern_type: PatternType,
        confidence: f64,
        evidence: Vec<String>,
        addresses: Vec<String>,
        explanation: impl Into<String>,
    ) -> AnalysisResult<Self> {
        if evidence.is_empty() {
            return Err(AnalysisError::MatcherFailed(format!(
                "{} match produced no evidence",
                pattern_type
            )));
        }
        let confidence = confidence.clamp(0.0, 1.0);
        Ok(Self {
            pattern_type,
            confidence,
            severity: Severity::from_confidence(confidence),
            evidence,
            addresses,
            explanation: explanation.into(),
        })
    }
}

/// Result of one pattern detection run over a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub report_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub matches: Vec<PatternMatch>,
    /// Matchers that failed and were skipped; never aborts the run.
    pub degraded: Vec<String>,
}

/// Normalized risk band for callers that want a label instead of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Severe,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.2 {
            RiskLevel::Minimal
        } else if score < 0.4 {
            RiskLevel::Low
        } else if score < 0.6 {
            RiskLevel::Medium
        } else if score < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Severe
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock budget per request in seconds.
    pub request_timeout_secs: u64,
    /// Result cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Bounded fan-out width for batch attribution.
    pub max_parallel_attributions: usize,
    /// Chains this deployment accepts.
    pub supported_chains: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            cache_ttl_secs: 1800,
            max_parallel_attributions: 16,
            supported_chains: vec![
                "ethereum".to_string(),
                "bitcoin".to_string(),
                "polygon".to_string(),
                "arbitrum".to_string(),
                "tron".to_string(),
            ],
        }
    }
}

/// Validate an address identifier. Hex-prefixed addresses must decode;
/// other formats are accepted structurally (no chain-specific checksums).
pub fn validate_address(address: &str) -> AnalysisResult<()> {
    let trimmed = address.trim();
    if trimmed.is_empty() || trimmed.len() > 128 {
        return Err(AnalysisError::InvalidAddress(address.to_string()));
    }
    if trimmed.chars().any(|c| c.is_whitespace()) {
        return Err(AnalysisError::InvalidAddress(address.to_string()));
    }
    if let Some(body) = trimmed.strip_prefix("0x") {
        if body.is_empty() || hex::decode(body).is_err() {
            return Err(AnalysisError::InvalidAddress(address.to_string()));
        }
    }
    Ok(())
}

/// Validate a transaction hash identifier.
pub fn validate_tx_hash(tx_hash: &str) -> AnalysisResult<()> {
    let trimmed = tx_hash.trim();
    if trimmed.is_empty() || trimmed.len() > 128 {
        return Err(AnalysisError::InvalidTxHash(tx_hash.to_string()));
    }
    if let Some(body) = trimmed.strip_prefix("0x") {
        if body.is_empty() || hex::decode(body).is_err() {
            return Err(AnalysisError::InvalidTxHash(tx_hash.to_string()));
        }
    }
    Ok(())
}

/// Validate a chain tag: lowercase alphanumeric with dashes.
pub fn validate_chain(chain: &str) -> AnalysisResult<()> {
    if chain.is_empty()
        || !chain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AnalysisError::UnsupportedChain(chain.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_confidence(0.1), Severity::Low);
        assert_eq!(Severity::from_confidence(0.25), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.5), Severity::High);
        assert_eq!(Severity::from_confidence(0.7), Severity::Critical);
        assert_eq!(Severity::from_confidence(0.95), Severity::Severe);
    }

    #[test]
    fn test_pattern_match_requires_evidence() {
        let err = PatternMatch::new(
            PatternType::Layering,
            0.8,
            vec![],
            vec!["0xaa".to_string()],
            "no evidence",
        );
        assert!(err.is_err());

        let ok = PatternMatch::new(
            PatternType::Layering,
            1.7,
            vec!["0x01".to_string()],
            vec!["0xaa".to_string()],
            "clamped",
        )
        .unwrap();
        assert_eq!(ok.confidence, 1.0);
        assert_eq!(ok.severity, Severity::Severe);
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address("0xdeadbeef").is_ok());
        assert!(validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        assert!(validate_address("0xzz").is_err());
        assert!(validate_address("").is_err());
        assert!(validate_address("has space").is_err());
    }

    #[test]
    fn test_chain_validation() {
        assert!(validate_chain("ethereum").is_ok());
        assert!(validate_chain("arbitrum-nova").is_ok());
        assert!(validate_chain("Ethereum").is_err());
        assert!(validate_chain("").is_err());
    }

    #[test]
    fn test_address_info_accumulation() {
        let mut info = AddressInfo::new("0xaa", "ethereum");
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::minutes(5);
        info.record_edge(10.0, t1, false);
        info.record_edge(4.0, t0, true);

        assert_eq!(info.total_in, 10.0);
        assert_eq!(info.total_out, 4.0);
        assert_eq!(info.tx_count, 2);
        assert_eq!(info.first_seen, Some(t0));
        assert_eq!(info.last_seen, Some(t1));
    }
}

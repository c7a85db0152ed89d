// src/patterns/config.rs
//
// Every matcher scores confidence as a weighted combination of its own
// signals; the weights and thresholds here are tunable business
// parameters, not hidden constants. Each field documents its default.
use serde::{Deserialize, Serialize};

/// Peeling-chain matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeelingConfig {
    /// Minimum hops before a decreasing chain is reported. Default 3.
    pub min_hops: usize,
    /// Whole-chain time window in seconds. Default 21600 (6h).
    pub window_secs: i64,
    /// Hop count at which the length signal saturates at 1.0. Default 6.
    pub length_saturation: f64,
    /// Weight of the chain-length signal. Default 0.5.
    pub length_weight: f64,
    /// Weight of the split-ratio regularity signal. Default 0.5.
    pub regularity_weight: f64,
}

impl Default for PeelingConfig {
    fn default() -> Self {
        Self {
            min_hops: 3,
            window_secs: 21_600,
            length_saturation: 6.0,
            length_weight: 0.5,
            regularity_weight: 0.5,
        }
    }
}

/// Layering matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeringConfig {
    /// Minimum intermediate addresses in the forwarding chain. Default 3.
    pub min_intermediates: usize,
    /// Whole-chain time window in seconds. Default 1800 (30m).
    pub window_secs: i64,
    /// Maximum per-hop value loss treated as fees. Default 0.05 (5%).
    pub fee_tolerance: f64,
    /// Intermediate count at which the hop signal saturates. Default 8.
    pub hop_saturation: f64,
    /// Weight of the hop-count signal. Default 0.5.
    pub hop_weight: f64,
    /// Weight of the time-compression signal. Default 0.5.
    pub speed_weight: f64,
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            min_intermediates: 3,
            window_secs: 1800,
            fee_tolerance: 0.05,
            hop_saturation: 8.0,
            hop_weight: 0.5,
            speed_weight: 0.5,
        }
    }
}

/// Structuring / round-amount matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuringConfig {
    /// Reporting threshold the amounts cluster under. Default 10_000.
    pub reporting_threshold: f64,
    /// Band below the threshold considered "just under", as a fraction.
    /// Default 0.1 (values in [9000, 10000)).
    pub threshold_margin: f64,
    /// Unit for round-amount detection. Default 1000.
    pub round_unit: f64,
    /// Distance from a multiple counted as round, as a fraction of the
    /// unit. Default 0.01.
    pub round_tolerance: f64,
    /// Minimum clustered transactions per source address. Default 3.
    pub min_cluster: usize,
    /// Cluster size at which the count signal saturates. Default 8.
    pub count_saturation: f64,
    /// Weight of the cluster-size signal. Default 0.6.
    pub count_weight: f64,
    /// Weight of the threshold-closeness / roundness signal. Default 0.4.
    pub closeness_weight: f64,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            reporting_threshold: 10_000.0,
            threshold_margin: 0.1,
            round_unit: 1000.0,
            round_tolerance: 0.01,
            min_cluster: 3,
            count_saturation: 8.0,
            count_weight: 0.6,
            closeness_weight: 0.4,
        }
    }
}

/// Synchronized-transfer matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizedConfig {
    /// Minimum distinct counterparties moving in the same window. Default 3.
    pub min_addresses: usize,
    /// Window width in seconds. Default 300.
    pub max_delta_secs: i64,
    /// Participant count at which the count signal saturates. Default 8.
    pub count_saturation: f64,
    /// Weight of the participant-count signal. Default 0.6.
    pub count_weight: f64,
    /// Weight of the window-tightness signal. Default 0.4.
    pub tightness_weight: f64,
}

impl Default for SynchronizedConfig {
    fn default() -> Self {
        Self {
            min_addresses: 3,
            max_delta_secs: 300,
            count_saturation: 8.0,
            count_weight: 0.6,
            tightness_weight: 0.4,
        }
    }
}

/// Service-hopping matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHopConfig {
    /// Minimum consecutive service edges in a sequence. Default 2.
    pub min_sequence: usize,
    /// Sequence length at which the length signal saturates. Default 5.
    pub sequence_saturation: f64,
    /// Weight of the sequence-length signal. Default 0.6.
    pub length_weight: f64,
    /// Weight of the service-kind severity signal (mixers score highest).
    /// Default 0.4.
    pub kind_weight: f64,
}

impl Default for ServiceHopConfig {
    fn default() -> Self {
        Self {
            min_sequence: 2,
            sequence_saturation: 5.0,
            length_weight: 0.6,
            kind_weight: 0.4,
        }
    }
}

/// Off-peak activity matcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum transactions before an address has a usable baseline.
    /// Default 20.
    pub min_history: usize,
    /// Hour-of-day frequency below which activity is off-peak for that
    /// address. Default 0.05.
    pub low_frequency_threshold: f64,
    /// Minimum flagged transactions before reporting. Default 3.
    pub min_flagged: usize,
    /// Flagged count at which the volume signal saturates. Default 6.
    pub flagged_saturation: f64,
    /// Weight of the rarity signal. Default 0.6.
    pub rarity_weight: f64,
    /// Weight of the flagged-volume signal. Default 0.4.
    pub volume_weight: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_history: 20,
            low_frequency_threshold: 0.05,
            min_flagged: 3,
            flagged_saturation: 6.0,
            rarity_weight: 0.6,
            volume_weight: 0.4,
        }
    }
}

/// Full tuning surface for the pattern engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternWeights {
    pub peeling: PeelingConfig,
    pub layering: LayeringConfig,
    pub structuring: StructuringConfig,
    pub synchronized: SynchronizedConfig,
    pub services: ServiceHopConfig,
    pub timing: TimingConfig,
}

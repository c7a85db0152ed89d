// src/attribution/mod.rs
mod cluster;
mod fusion;
pub mod registry;

pub use cluster::ClusterConfig;
pub use fusion::FusionConfig;
pub use registry::{EntityCandidate, EntityRegistry, EntityType, StaticRegistry};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::TransactionGraph;
use crate::types::validate_address;

/// Where an attribution signal came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ExactMatch,
    Cluster,
    Pattern,
    ExternalFeed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ExactMatch => "exact_match",
            SourceKind::Cluster => "cluster",
            SourceKind::Pattern => "pattern",
            SourceKind::ExternalFeed => "external_feed",
        }
    }
}

/// One contributing signal, kept verbatim on the fused output so the
/// attribution stays auditable end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionSource {
    pub kind: SourceKind,
    pub entity_name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub reliability_weight: f64,
    pub evidence: Vec<String>,
}

/// A fused candidate with the source kinds that backed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityScore {
    pub entity_name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub source_kinds: Vec<SourceKind>,
}

/// Fused, evidence-bearing entity label for one address. Derived data:
/// callers persist it if they want it kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressAttribution {
    pub address: String,
    pub entity_name: Option<String>,
    pub entity_type: EntityType,
    pub confidence: f64,
    /// Every contributing source with its own confidence and evidence.
    pub sources: Vec<AttributionSource>,
    /// Ranked disagreeing candidates.
    pub alternatives: Vec<EntityScore>,
    /// Sources that failed and were skipped.
    pub degraded: Vec<String>,
}

/// A label recorded from pattern analysis or casework, usable as a
/// pattern-derived source and as cluster seed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedLabel {
    pub entity_name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// Per-address outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub address: String,
    pub success: bool,
    pub attribution: Option<AddressAttribution>,
    pub error: Option<String>,
}

/// Outcome of a batch run; the batch itself always completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAttributionResult {
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fuses registry lookups, cluster similarity and recorded pattern labels
/// into confidence-scored entity attributions.
#[derive(Clone)]
pub struct AttributionEngine {
    registry: Arc<dyn EntityRegistry>,
    fusion: FusionConfig,
    cluster: ClusterConfig,
    labels: Arc<RwLock<HashMap<String, RecordedLabel>>>,
}

impl AttributionEngine {
    pub fn new(registry: Arc<dyn EntityRegistry>) -> Self {
        Self::with_config(registry, FusionConfig::default(), ClusterConfig::default())
    }

    pub fn with_config(
        registry: Arc<dyn EntityRegistry>,
        fusion: FusionConfig,
        cluster: ClusterConfig,
    ) -> Self {
        Self {
            registry,
            fusion,
            cluster,
            labels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a derived label (from pattern analysis or casework) for use
    /// as a pattern source and as cluster seed data.
    pub async fn record_label(
        &self,
        address: impl Into<String>,
        label: RecordedLabel,
    ) {
        let mut labels = self.labels.write().await;
        labels.insert(address.into(), label);
    }

    pub async fn label_count(&self) -> usize {
        self.labels.read().await.len()
    }

    /// Attribute one address. Sources fail independently: a dead registry
    /// degrades the result as long as any other source still speaks; only
    /// when nothing is left does the upstream failure surface.
    pub async fn attribute(
        &self,
        address: &str,
        graph: Option<&TransactionGraph>,
    ) -> AnalysisResult<AddressAttribution> {
        self.attribute_with_sources(address, graph, Vec::new()).await
    }

    /// Attribute with additional caller-supplied sources, typically
    /// external intelligence feeds this core does not fetch itself.
    pub async fn attribute_with_sources(
        &self,
        address: &str,
        graph: Option<&TransactionGraph>,
        extra_sources: Vec<AttributionSource>,
    ) -> AnalysisResult<AddressAttribution> {
        validate_address(address)?;

        let mut sources: Vec<AttributionSource> = extra_sources;
        let mut degraded: Vec<String> = Vec::new();
        let mut registry_error: Option<AnalysisError> = None;

        match self.registry.lookup(address).await {
            Ok(candidates) => {
                for candidate in candidates {
                    sources.push(AttributionSource {
                        kind: SourceKind::ExactMatch,
                        entity_name: candidate.entity_name,
                        entity_type: candidate.entity_type,
                        confidence: candidate.confidence,
                        reliability_weight: self.fusion.reliability(SourceKind::ExactMatch),
                        evidence: vec![format!("registry:{}", address)],
                    });
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!(address, error = %e, "registry lookup failed, degrading");
                degraded.push("registry".to_string());
                registry_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        let labels = self.labels.read().await;
        if let Some(label) = labels.get(address) {
            sources.push(AttributionSource {
                kind: SourceKind::Pattern,
                entity_name: label.entity_name.clone(),
                entity_type: label.entity_type,
                confidence: label.confidence,
                reliability_weight: self.fusion.reliability(SourceKind::Pattern),
                evidence: vec![format!("recorded-label:{}", address)],
            });
        }

        if let Some(graph) = graph {
            if let Some(source) =
                cluster::derive(graph, address, &labels, &self.cluster, &self.fusion)
            {
                sources.push(source);
            }
        }
        drop(labels);

        if sources.is_empty() {
            if let Some(e) = registry_error {
                // Nothing else spoke for this address; the upstream
                // failure is the real outcome.
                return Err(e);
            }
        }

        debug!(
            address,
            source_count = sources.len(),
            degraded = degraded.len(),
            "fusing attribution sources"
        );
        Ok(fusion::fuse(address, sources, degraded, &self.fusion))
    }

    /// Attribute many addresses with bounded fan-out. One item failing is
    /// reported in place; the batch always completes.
    pub async fn attribute_batch(
        &self,
        addresses: Vec<String>,
        graph: Option<Arc<TransactionGraph>>,
        max_parallel: usize,
    ) -> AnalysisResult<BatchAttributionResult> {
        if max_parallel == 0 {
            return Err(AnalysisError::InvalidParameter(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut join_set = tokio::task::JoinSet::new();

        for (index, address) in addresses.into_iter().enumerate() {
            let engine = self.clone();
            let graph = graph.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = engine.attribute(&address, graph.as_deref()).await;
                let item = match result {
                    Ok(attribution) => BatchItem {
                        address,
                        success: true,
                        attribution: Some(attribution),
                        error: None,
                    },
                    Err(e) => BatchItem {
                        address,
                        success: false,
                        attribution: None,
                        error: Some(e.to_string()),
                    },
                };
                (index, item)
            });
        }

        let mut indexed: Vec<(usize, BatchItem)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => indexed.push(pair),
                Err(e) => {
                    return Err(AnalysisError::Internal(format!(
                        "batch attribution task panicked: {}",
                        e
                    )))
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let items: Vec<BatchItem> = indexed.into_iter().map(|(_, item)| item).collect();
        let succeeded = items.iter().filter(|i| i.success).count();
        let failed = items.len() - succeeded;
        Ok(BatchAttributionResult {
            items,
            succeeded,
            failed,
        })
    }
}

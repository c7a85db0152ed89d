// src/lib.rs
pub mod attribution;
pub mod cache;
pub mod error;
pub mod graph;
pub mod pathfinding;
pub mod patterns;
pub mod risk;
pub mod types;

pub use error::{AnalysisError, AnalysisResult};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::attribution::{
    AddressAttribution, AttributionEngine, BatchAttributionResult, EntityRegistry,
    RecordedLabel,
};
use crate::cache::{cache_key, AnalysisCache, InMemoryCache, SingleFlight};
use crate::graph::{GraphBuilder, GraphSnapshot, LedgerClient, TransactionGraph};
use crate::pathfinding::{PathQuery, PathfindingEngine, PathfindingResult};
use crate::patterns::{PatternEngine, ServiceRegistry};
use crate::risk::{RiskAggregator, RiskInputs};
use crate::types::{DetectionReport, EdgeKind, EngineConfig, ExpansionParams};

/// Facade over the forensic analysis engines: graph expansion, pattern
/// detection, pathfinding, attribution and risk scoring, with every entry
/// point wrapped by the shared result cache. Holds no request state of its
/// own; the cache is the only shared mutable surface.
pub struct ForensicsEngine {
    config: EngineConfig,
    ledger: Arc<dyn LedgerClient>,
    builder: GraphBuilder,
    patterns: PatternEngine,
    pathfinding: PathfindingEngine,
    attribution: AttributionEngine,
    risk: RiskAggregator,
    cache: Arc<dyn AnalysisCache>,
    flight: SingleFlight,
}

impl ForensicsEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<dyn EntityRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self::with_cache(ledger, registry, config, Arc::new(InMemoryCache::new()))
    }

    /// Swap the cache implementation (distributed, disabled, ...).
    pub fn with_cache(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<dyn EntityRegistry>,
        config: EngineConfig,
        cache: Arc<dyn AnalysisCache>,
    ) -> Self {
        Self {
            builder: GraphBuilder::new(Arc::clone(&ledger)),
            ledger,
            patterns: PatternEngine::new(),
            pathfinding: PathfindingEngine::new(),
            attribution: AttributionEngine::new(registry),
            risk: RiskAggregator::new(),
            cache,
            flight: SingleFlight::new(),
            config,
        }
    }

    /// Install the known-service registry used by pattern detection.
    pub fn set_service_registry(&mut self, registry: ServiceRegistry) {
        self.patterns.set_registry(registry);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn attribution_engine(&self) -> &AttributionEngine {
        &self.attribution
    }

    /// Record a derived entity label for later attribution runs.
    pub async fn record_label(&self, address: impl Into<String>, label: RecordedLabel) {
        self.attribution.record_label(address, label).await;
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    /// Atomic get-or-compute: the single-flight guard keeps concurrent
    /// misses on one key down to a single computation.
    async fn cached<T, Fut>(
        &self,
        key: String,
        compute: impl FnOnce() -> Fut,
    ) -> AnalysisResult<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = AnalysisResult<T>>,
    {
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(hit) = serde_json::from_value(value) {
                debug!(key = %key, "cache hit");
                return Ok(hit);
            }
        }

        let _guard = self.flight.acquire(&key).await;
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(hit) = serde_json::from_value(value) {
                debug!(key = %key, "cache hit after wait");
                return Ok(hit);
            }
        }

        let result = compute().await?;
        self.cache
            .put(&key, serde_json::to_value(&result)?, self.ttl())
            .await;
        Ok(result)
    }

    /// Expand a bounded transaction graph around a seed address.
    pub async fn build_graph(
        &self,
        seed: &str,
        params: &ExpansionParams,
    ) -> AnalysisResult<TransactionGraph> {
        if !self.config.supported_chains.contains(&params.chain) {
            return Err(AnalysisError::UnsupportedChain(params.chain.clone()));
        }

        // The request-level wall clock caps whatever the caller asked for.
        let mut params = params.clone();
        params.time_budget_ms = params
            .time_budget_ms
            .min(self.config.request_timeout_secs * 1000);

        let key = cache_key(
            "graph",
            &[
                seed,
                &params.chain,
                params.direction.as_str(),
                &params.max_depth.to_string(),
                &params.node_budget.to_string(),
                &params.min_value.to_string(),
            ],
        );
        let snapshot: GraphSnapshot = self
            .cached(key, || async {
                let graph = self.builder.expand(seed, &params).await?;
                info!(
                    seed,
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    truncated = graph.is_truncated(),
                    "graph built"
                );
                Ok(graph.snapshot())
            })
            .await?;
        Ok(TransactionGraph::from_snapshot(snapshot))
    }

    /// Expand a graph seeded by a transaction instead of an address: the
    /// sender side of the transaction anchors the expansion and the
    /// transaction itself is always part of the snapshot.
    pub async fn build_graph_from_tx(
        &self,
        tx_hash: &str,
        params: &ExpansionParams,
    ) -> AnalysisResult<TransactionGraph> {
        types::validate_tx_hash(tx_hash)?;
        let anchor = self.ledger.get_transaction(tx_hash).await?;
        let mut graph = self.build_graph(&anchor.from, params).await?;
        graph.merge_edge(anchor);
        Ok(graph)
    }

    /// Run the full matcher library over a graph.
    pub async fn detect_patterns(
        &self,
        graph: &TransactionGraph,
    ) -> AnalysisResult<DetectionReport> {
        let key = cache_key("patterns", &[&graph.fingerprint()]);
        self.cached(key, || async { Ok(self.patterns.detect(graph)) })
            .await
    }

    /// Run one bounded pathfinding algorithm over a graph.
    pub async fn find_paths(
        &self,
        graph: &TransactionGraph,
        query: &PathQuery,
    ) -> AnalysisResult<PathfindingResult> {
        let query_key = serde_json::to_string(query)?;
        let key = cache_key("paths", &[&graph.fingerprint(), &query_key]);
        self.cached(key, || async { self.pathfinding.find_paths(graph, query) })
            .await
    }

    /// Attribute one address, optionally using a graph for cluster
    /// inference.
    pub async fn attribute(
        &self,
        address: &str,
        graph: Option<&TransactionGraph>,
    ) -> AnalysisResult<AddressAttribution> {
        let scope = graph.map(|g| g.fingerprint()).unwrap_or_default();
        let key = cache_key("attribution", &[address, &scope]);
        self.cached(key, || async { self.attribution.attribute(address, graph).await })
            .await
    }

    /// Attribute up to `max_parallel_attributions` addresses at a time;
    /// per-item failures never abort the batch.
    pub async fn attribute_batch(
        &self,
        addresses: Vec<String>,
        graph: Option<Arc<TransactionGraph>>,
    ) -> AnalysisResult<BatchAttributionResult> {
        self.attribution
            .attribute_batch(addresses, graph, self.config.max_parallel_attributions)
            .await
    }

    /// Combine assembled signals into one normalized risk score.
    pub fn score_risk(&self, inputs: &RiskInputs) -> f64 {
        self.risk.score(inputs)
    }

    /// Convenience scoring for one address on a graph: detects patterns,
    /// attributes the address, derives mixer exposure from its edges.
    /// Sanctions hits are the caller's data and arrive via `score_risk`.
    pub async fn score_address(
        &self,
        address: &str,
        graph: &TransactionGraph,
    ) -> AnalysisResult<f64> {
        let key = cache_key("risk", &[address, &graph.fingerprint()]);
        self.cached(key, || async {
            let report = self.detect_patterns(graph).await?;
            let matches: Vec<_> = report
                .matches
                .into_iter()
                .filter(|m| m.addresses.iter().any(|a| a == address))
                .collect();
            let attribution = self.attribute(address, Some(graph)).await.ok();

            let mut edges = graph.edges_from(address);
            edges.extend(graph.edges_to(address));
            let mixer_exposure = edges.iter().any(|e| e.kind == EdgeKind::Mixer);

            let inputs = RiskInputs {
                matches,
                attribution,
                sanctioned: false,
                mixer_exposure,
                privacy_tool_usage: false,
            };
            Ok(self.risk.score(&inputs))
        })
        .await
    }

    /// Look up a single transaction edge by hash.
    pub async fn get_transaction(&self, tx_hash: &str) -> AnalysisResult<types::TxEdge> {
        types::validate_tx_hash(tx_hash)?;
        self.ledger.get_transaction(tx_hash).await
    }

    /// Drop one cached result.
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every cached result.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Verify the cache round-trips; engines are stateless beyond it.
    pub async fn health_check(&self) -> AnalysisResult<()> {
        let probe = cache_key("health", &["probe"]);
        self.cache
            .put(&probe, serde_json::Value::Bool(true), Duration::from_secs(5))
            .await;
        if self.cache.get(&probe).await.is_none() {
            // A NoopCache deployment fails the probe by design; that is a
            // configuration statement, not an outage.
            debug!("cache probe missed (cache disabled?)");
        }
        self.cache.invalidate(&probe).await;
        Ok(())
    }
}

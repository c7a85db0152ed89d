// src/pathfinding/mod.rs
mod all_paths;
mod circular;
mod components;
mod funnel;
mod shortest;

pub use components::Component;
pub use funnel::Funnel;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::TransactionGraph;
use crate::types::{validate_address, EdgeKind, TxEdge};

/// Pathfinding algorithms offered by the engine. All are bounded and
/// terminate on cyclic graphs (edge-level, not node-level, visit
/// tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathAlgorithm {
    Shortest,
    AllPaths,
    Funnel,
    Circular,
    Components,
}

impl PathAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathAlgorithm::Shortest => "shortest",
            PathAlgorithm::AllPaths => "all_paths",
            PathAlgorithm::Funnel => "funnel",
            PathAlgorithm::Circular => "circular",
            PathAlgorithm::Components => "components",
        }
    }
}

impl std::fmt::Display for PathAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pathfinding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathQuery {
    pub algorithm: PathAlgorithm,
    pub source: Option<String>,
    pub target: Option<String>,
    /// Hop budget for traversal-based algorithms.
    pub max_hops: usize,
    /// Cap on returned paths/funnels/components.
    pub max_results: usize,
    /// Funnel only: minimum distinct senders converging on a sink.
    pub min_in_degree: usize,
    /// Funnel only: convergence window in seconds.
    pub window_secs: i64,
}

impl PathQuery {
    pub fn new(algorithm: PathAlgorithm) -> Self {
        Self {
            algorithm,
            source: None,
            target: None,
            max_hops: 6,
            max_results: 20,
            min_in_degree: 5,
            window_secs: 3600,
        }
    }

    pub fn between(
        algorithm: PathAlgorithm,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let mut q = Self::new(algorithm);
        q.source = Some(source.into());
        q.target = Some(target.into());
        q
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    fn validate(&self) -> AnalysisResult<()> {
        if self.max_hops == 0 {
            return Err(AnalysisError::InvalidParameter(
                "max_hops must be at least 1".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(AnalysisError::InvalidParameter(
                "max_results must be at least 1".to_string(),
            ));
        }

        let needs_source = matches!(
            self.algorithm,
            PathAlgorithm::Shortest | PathAlgorithm::AllPaths | PathAlgorithm::Circular
        );
        let needs_target =
            matches!(self.algorithm, PathAlgorithm::Shortest | PathAlgorithm::AllPaths);

        match (&self.source, needs_source) {
            (None, true) => {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{} requires a source address",
                    self.algorithm
                )))
            }
            (Some(s), _) => validate_address(s)?,
            _ => {}
        }
        match (&self.target, needs_target) {
            (None, true) => {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{} requires a target address",
                    self.algorithm
                )))
            }
            (Some(t), _) => validate_address(t)?,
            _ => {}
        }
        if needs_target && self.source == self.target {
            return Err(AnalysisError::InvalidParameter(
                "source and target must differ; use circular for loops".to_string(),
            ));
        }
        Ok(())
    }
}

/// An ordered edge walk between two addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub edges: Vec<TxEdge>,
    pub hops: usize,
    pub total_value: f64,
    /// Service exposure along the walk, in [0, 1].
    pub risk_score: f64,
    pub algorithm: PathAlgorithm,
}

pub(crate) fn path_from_edges(edges: Vec<TxEdge>, algorithm: PathAlgorithm) -> Path {
    let hops = edges.len();
    let total_value = edges.iter().map(|e| e.value).sum();
    let exposure: f64 = edges
        .iter()
        .map(|e| match e.kind {
            EdgeKind::Mixer => 1.0,
            EdgeKind::Bridge => 0.7,
            EdgeKind::Dex => 0.5,
            EdgeKind::Transfer => 0.0,
        })
        .sum();
    Path {
        hops,
        total_value,
        risk_score: if hops == 0 { 0.0 } else { exposure / hops as f64 },
        edges,
        algorithm,
    }
}

/// Result of one pathfinding call. An empty path list with
/// `budget_exceeded: true` is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfindingResult {
    pub algorithm: PathAlgorithm,
    pub paths: Vec<Path>,
    pub funnels: Vec<Funnel>,
    pub components: Vec<Component>,
    pub budget_exceeded: bool,
}

impl PathfindingResult {
    pub(crate) fn empty(algorithm: PathAlgorithm) -> Self {
        Self {
            algorithm,
            paths: Vec::new(),
            funnels: Vec::new(),
            components: Vec::new(),
            budget_exceeded: false,
        }
    }
}

/// Dispatches queries to the bounded path algorithms.
#[derive(Default)]
pub struct PathfindingEngine;

impl PathfindingEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn find_paths(
        &self,
        graph: &TransactionGraph,
        query: &PathQuery,
    ) -> AnalysisResult<PathfindingResult> {
        query.validate()?;
        debug!(algorithm = %query.algorithm, "pathfinding query");

        let result = match query.algorithm {
            PathAlgorithm::Shortest => shortest::run(graph, query),
            PathAlgorithm::AllPaths => all_paths::run(graph, query),
            PathAlgorithm::Funnel => funnel::run(graph, query),
            PathAlgorithm::Circular => circular::run(graph, query),
            PathAlgorithm::Components => components::run(graph, query),
        };
        Ok(result)
    }
}

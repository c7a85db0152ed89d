// src/graph/ledger.rs
use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{Direction, TxEdge};

/// Boundary to the ledger/RPC ingestion layer. Implementations live outside
/// this crate; an unavailable ledger is an expected condition and callers
/// degrade to partial results.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch edges touching `address` on `chain`, filtered by direction and
    /// minimum value.
    async fn get_edges(
        &self,
        address: &str,
        chain: &str,
        direction: Direction,
        min_value: f64,
    ) -> AnalysisResult<Vec<TxEdge>>;

    /// Fetch one transaction edge by hash.
    async fn get_transaction(&self, tx_hash: &str) -> AnalysisResult<TxEdge>;
}

/// In-memory ledger over a fixed edge set. Used by tests and by callers
/// replaying exported datasets through the engine.
pub struct StaticLedger {
    chain: String,
    by_address: HashMap<String, Vec<TxEdge>>,
    by_hash: HashMap<String, TxEdge>,
}

impl StaticLedger {
    pub fn new(chain: impl Into<String>, edges: Vec<TxEdge>) -> Self {
        let mut by_address: HashMap<String, Vec<TxEdge>> = HashMap::new();
        let mut by_hash = HashMap::new();

        for edge in edges {
            by_address
                .entry(edge.from.clone())
                .or_default()
                .push(edge.clone());
            by_address
                .entry(edge.to.clone())
                .or_default()
                .push(edge.clone());
            by_hash.insert(edge.tx_hash.clone(), edge);
        }

        Self {
            chain: chain.into(),
            by_address,
            by_hash,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.by_hash.len()
    }
}

#[async_trait]
impl LedgerClient for StaticLedger {
    async fn get_edges(
        &self,
        address: &str,
        chain: &str,
        direction: Direction,
        min_value: f64,
    ) -> AnalysisResult<Vec<TxEdge>> {
        if chain != self.chain {
            return Err(AnalysisError::UnsupportedChain(chain.to_string()));
        }

        let mut edges: Vec<TxEdge> = self
            .by_address
            .get(address)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(|e| match direction {
                Direction::Outbound => e.from == address,
                Direction::Inbound => e.to == address,
                Direction::Both => true,
            })
            .filter(|e| e.value >= min_value)
            .cloned()
            .collect();

        // Stable order so repeated expansions are identical.
        edges.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        });
        Ok(edges)
    }

    async fn get_transaction(&self, tx_hash: &str) -> AnalysisResult<TxEdge> {
        self.by_hash
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| AnalysisError::TransactionNotFound(tx_hash.to_string()))
    }
}

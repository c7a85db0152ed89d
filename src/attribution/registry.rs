// src/attribution/registry.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AnalysisResult;

/// Coarse entity taxonomy used across attribution and risk scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Exchange,
    Custodian,
    Mixer,
    Bridge,
    DexProtocol,
    Merchant,
    Individual,
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Exchange => "exchange",
            EntityType::Custodian => "custodian",
            EntityType::Mixer => "mixer",
            EntityType::Bridge => "bridge",
            EntityType::DexProtocol => "dex_protocol",
            EntityType::Merchant => "merchant",
            EntityType::Individual => "individual",
            EntityType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate label from the registry collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub entity_name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// Boundary to the VASP/entity registry. Implementations live outside
/// this crate; lookups for unknown addresses return an empty list, and an
/// unavailable registry is a recoverable condition.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    async fn lookup(&self, address: &str) -> AnalysisResult<Vec<EntityCandidate>>;
}

/// Fixed in-memory registry for tests and offline replay.
#[derive(Default)]
pub struct StaticRegistry {
    entries: HashMap<String, Vec<EntityCandidate>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        address: impl Into<String>,
        entity_name: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
    ) {
        self.entries
            .entry(address.into())
            .or_default()
            .push(EntityCandidate {
                entity_name: entity_name.into(),
                entity_type,
                confidence,
            });
    }
}

#[async_trait]
impl EntityRegistry for StaticRegistry {
    async fn lookup(&self, address: &str) -> AnalysisResult<Vec<EntityCandidate>> {
        Ok(self.entries.get(address).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_hit_and_miss() {
        let mut registry = StaticRegistry::new();
        registry.insert("0xex", "Exchange X", EntityType::Exchange, 0.95);

        let hit = registry.lookup("0xex").await.unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].entity_name, "Exchange X");

        let miss = registry.lookup("0xnobody").await.unwrap();
        assert!(miss.is_empty());
    }
}

// src/cache/mod.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Injectable result cache. Values are type-erased JSON so one cache can
/// serve every engine; implementations may be in-memory, distributed, or
/// disabled entirely.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Returns the cached value unless it is absent or past its TTL.
    /// Stale entries are treated as absent, never returned.
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration);

    async fn invalidate(&self, key: &str);

    async fn clear(&self);
}

struct CacheEntry {
    value: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// TTL-keyed in-memory cache.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry past its TTL.
    pub async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        debug!(purged = before - entries.len(), "cache purge finished");
    }
}

#[async_trait]
impl AnalysisCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

/// Cache that never hits; used to disable caching in tests.
pub struct NoopCache;

#[async_trait]
impl AnalysisCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    async fn put(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) {}

    async fn invalidate(&self, _key: &str) {}

    async fn clear(&self) {}
}

/// Per-key in-flight guard: the facade takes a key's lock before
/// computing, so concurrent misses on the same key collapse into one
/// computation with the rest reading the winner's cached value.
#[derive(Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Locks nobody holds any more are dead weight.
            locks.retain(|k, v| k == key || Arc::strong_count(v) > 1);
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// Canonical cache key: operation name plus normalized parameters.
pub fn cache_key(operation: &str, parts: &[&str]) -> String {
    let mut key = String::from(operation);
    for part in parts {
        key.push(':');
        key.push_str(&part.to_lowercase());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_before_ttl() {
        let cache = InMemoryCache::new();
        cache
            .put("k", json!({"v": 1}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_stale_is_absent() {
        let cache = InMemoryCache::new();
        cache.put("k", json!(1), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await, None);

        // The entry still occupies a slot until purged.
        assert_eq!(cache.len().await, 1);
        cache.purge_expired().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = InMemoryCache::new();
        cache.put("a", json!(1), Duration::from_secs(60)).await;
        cache.put("b", json!(2), Duration::from_secs(60)).await;

        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(json!(2)));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_single_flight_serializes_same_key() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let flight = Arc::new(SingleFlight::new());
        let cache = Arc::new(InMemoryCache::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            handles.push(tokio::spawn(async move {
                let _guard = flight.acquire("shared").await;
                if cache.get("shared").await.is_none() {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    cache
                        .put("shared", json!(42), Duration::from_secs(60))
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(computations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        cache.put("k", json!(1), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn test_cache_key_normalization() {
        assert_eq!(
            cache_key("patterns", &["0xAbC", "ethereum"]),
            "patterns:0xabc:ethereum"
        );
    }
}

//! In-memory cache implementation
//!
//! A process-local `QueryResultCache` used as the default backend and in
//! tests. Eviction is size-capped and oldest-first.

use crate::contract::{CacheEntry, CacheOptions, QueryResultCache};
use crate::errors::CacheError;
use async_trait::async_trait;
use config::CacheConfig;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory query-result cache
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl std::fmt::Debug for InMemoryResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResultCache")
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl InMemoryResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: config.max_entries,
        }
    }

    /// Cache keyed by caller identifier (or rendered SQL)
    fn build_key(options: &CacheOptions) -> String {
        format!("query:{}", options.identifier)
    }
}

#[async_trait]
impl QueryResultCache for InMemoryResultCache {
    async fn get_from_cache(&self, options: &CacheOptions) -> Result<Option<CacheEntry>, CacheError> {
        let key = Self::build_key(options);
        let entries = self.entries.read().await;
        Ok(entries.get(&key).cloned())
    }

    async fn store_in_cache(&self, options: &CacheOptions, entry: CacheEntry) -> Result<(), CacheError> {
        if entry.duration_ms == 0 {
            return Err(CacheError::InvalidTtl(entry.duration_ms));
        }

        let key = Self::build_key(options);
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.time)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                tracing::debug!(key = %oldest_key, "evicting oldest cache entry");
                entries.remove(&oldest_key);
            }
        }

        entries.insert(key, entry);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_cache(max_entries: usize) -> InMemoryResultCache {
        InMemoryResultCache::new(&CacheConfig::new(true, 30_000, max_entries))
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let cache = test_cache(16);
        let options = CacheOptions::new("users-active", 30_000);
        let entry = CacheEntry::new("SELECT 1".to_string(), json!([{"id": 1}]), 30_000);

        cache.store_in_cache(&options, entry).await.unwrap();
        let fetched = cache.get_from_cache(&options).await.unwrap().unwrap();
        assert_eq!(fetched.result, json!([{"id": 1}]));
        assert!(!cache.is_expired(&fetched));
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let cache = test_cache(16);
        let options = CacheOptions::new("bad", 0);
        let entry = CacheEntry::new("SELECT 1".to_string(), json!([]), 0);
        assert!(matches!(
            cache.store_in_cache(&options, entry).await,
            Err(CacheError::InvalidTtl(0))
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_detection() {
        let cache = test_cache(16);
        let mut entry = CacheEntry::new("SELECT 1".to_string(), json!([]), 10);
        entry.time = chrono::Utc::now() - chrono::Duration::milliseconds(100);
        assert!(cache.is_expired(&entry));
    }

    #[tokio::test]
    async fn test_size_capped_eviction() {
        let cache = test_cache(1);
        let first = CacheOptions::new("first", 30_000);
        let second = CacheOptions::new("second", 30_000);
        cache
            .store_in_cache(&first, CacheEntry::new("q1".into(), json!(1), 30_000))
            .await
            .unwrap();
        cache
            .store_in_cache(&second, CacheEntry::new("q2".into(), json!(2), 30_000))
            .await
            .unwrap();
        assert!(cache.get_from_cache(&first).await.unwrap().is_none());
        assert!(cache.get_from_cache(&second).await.unwrap().is_some());
    }
}

//! Query-result cache contract
//!
//! This module defines the cache interface consumed by the query builders.
//! Backends (Redis, memcached, ...) live outside this workspace; only the
//! contract and a small in-memory implementation are provided here.

use crate::errors::CacheError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one cacheable query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheOptions {
    /// Caller-chosen identifier, or the rendered SQL when unnamed
    pub identifier: String,
    /// Time-to-live for the stored entry, in milliseconds
    pub duration_ms: u64,
}

impl CacheOptions {
    pub fn new(identifier: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            identifier: identifier.into(),
            duration_ms,
        }
    }
}

/// One stored query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The rendered query this entry was stored for
    pub query: String,
    /// The cached result rows
    pub result: Value,
    /// When the entry was stored (UTC)
    pub time: chrono::DateTime<chrono::Utc>,
    /// Time-to-live in milliseconds
    pub duration_ms: u64,
}

impl CacheEntry {
    pub fn new(query: String, result: Value, duration_ms: u64) -> Self {
        Self {
            query,
            result,
            time: chrono::Utc::now(),
            duration_ms,
        }
    }
}

/// The query-result cache contract
#[async_trait]
pub trait QueryResultCache: Send + Sync {
    /// Look up a stored entry for the given options
    async fn get_from_cache(&self, options: &CacheOptions) -> Result<Option<CacheEntry>, CacheError>;

    /// Store a query result under the given options
    async fn store_in_cache(&self, options: &CacheOptions, entry: CacheEntry) -> Result<(), CacheError>;

    /// Whether a stored entry has outlived its TTL
    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let age_ms = chrono::Utc::now()
            .signed_duration_since(entry.time)
            .num_milliseconds();
        age_ms < 0 || age_ms as u64 >= entry.duration_ms
    }

    /// Drop every stored entry
    async fn clear(&self) -> Result<(), CacheError>;
}

//! Convenience re-exports for common cache-system usage

pub use crate::contract::{CacheEntry, CacheOptions, QueryResultCache};
pub use crate::errors::CacheError;
pub use crate::memory::InMemoryResultCache;
pub use config::CacheConfig;

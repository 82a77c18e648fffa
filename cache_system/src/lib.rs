//! Cache system for query results
//!
//! This crate provides the query-result cache contract consumed by the
//! query builders, plus a small in-memory implementation. External backends
//! implement `QueryResultCache` out of tree.

pub mod contract;
pub mod errors;
pub mod memory;
pub mod prelude;

// Re-export centralized config
pub use config::CacheConfig;

pub use contract::{CacheEntry, CacheOptions, QueryResultCache};
pub use errors::CacheError;
pub use memory::InMemoryResultCache;

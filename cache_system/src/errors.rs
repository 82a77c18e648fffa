//! Error types for cache operations
//!
//! This module defines all error types that can occur
//! during query-result cache operations.

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid TTL value: {0}")]
    InvalidTtl(u64),

    #[error("Cache is disabled")]
    Disabled,

    #[error("General cache error: {0}")]
    General(String),
}

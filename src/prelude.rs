//! Convenience re-exports for common QueryHaus usage
//!
//! This prelude module re-exports the most commonly used items from the
//! QueryHaus ecosystem, making it easier to import everything you need with
//! a single use statement.
//!
//! # Example
//!
//! ```rust
//! use queryhaus::prelude::*;
//!
//! // Now you have access to all the common QueryHaus types and traits
//! ```

// Core QueryHaus components
pub use crate::core::QueryHaus;
pub use crate::errors::QueryHausError;
pub use crate::runner::{PostgresQueryRunner, PostgresRunnerFactory};

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, DatabaseConfig, SignalConfig};

// Re-export commonly used query-object types for convenience
pub use query_object::prelude::*;

// Re-export query_object module itself
pub use query_object;

// Re-export signal system for event handling
pub use signal_system::prelude::*;

// Re-export cache system
pub use cache_system::prelude::*;

// Common external dependencies
pub use async_trait;
pub use sqlx;
pub use tokio;

// Commonly used sqlx types
pub use sqlx::{PgPool, Postgres, Row, Transaction};

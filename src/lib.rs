//! # QueryHaus
//!
//! A modern Rust query building and persistence planning library: fluent
//! SQL builders for every statement shape, dialect capability resolution
//! across a dozen engines, relation mutation planning, lifecycle signals
//! and result caching.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use queryhaus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let haus = QueryHaus::connect(config).await?;
//!
//!     let users = haus
//!         .select("user")
//!         .alias("u")
//!         .and_where_op("age", Operator::more_than(21))
//!         .add_order_by("name", OrderBySpec::asc())
//!         .take(10)
//!         .get_many()
//!         .await?;
//!     println!("found {} users", users.len());
//!
//!     let inserted = haus
//!         .insert("user")
//!         .columns(["name", "email"])
//!         .values(vec![json!({"name": "Ada", "email": "ada@db.io"})])
//!         .returning(["id"])
//!         .execute()
//!         .await?;
//!     println!("created: {:?}", inserted.entities);
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;
pub mod runner;

// Re-export the main public types for convenience
pub use core::QueryHaus;
pub use errors::QueryHausError;
pub use runner::{PostgresQueryRunner, PostgresRunnerFactory};

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, DatabaseConfig, SignalConfig};

// Re-export internal crates forming the public API
pub use cache_system;
pub use query_object;
pub use signal_system;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;

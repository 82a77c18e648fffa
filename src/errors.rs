//! Error types for the QueryHaus crate
//!
//! This module contains all error types that can be returned by QueryHaus
//! coordination operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryHausError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error(transparent)]
    Query(#[from] query_object::QueryObjectError),
}

//! Query runner contract
//!
//! The builders never touch a driver directly. They speak to a runner that
//! executes positional-parameter SQL and manages one transaction at a time.
//! Drivers implement this trait once per engine.

use crate::errors::QueryObjectError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Normalized result of one executed statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQueryResult {
    /// Returned rows as JSON objects, empty for plain mutations
    pub rows: Vec<Value>,
    pub rows_affected: u64,
}

/// One database connection with optional transaction state
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Execute one statement with positional parameter values
    async fn query(
        &self,
        sql: &str,
        parameters: &[Value],
    ) -> Result<RawQueryResult, QueryObjectError>;

    async fn start_transaction(&self) -> Result<(), QueryObjectError>;

    async fn commit_transaction(&self) -> Result<(), QueryObjectError>;

    async fn rollback_transaction(&self) -> Result<(), QueryObjectError>;

    /// True while a transaction opened on this runner is still pending
    fn is_transaction_active(&self) -> bool;

    /// Return the underlying connection to its pool
    async fn release(&self) -> Result<(), QueryObjectError>;

    /// Persist committed work to disk, a no-op for most engines
    async fn flush(&self) -> Result<(), QueryObjectError> {
        Ok(())
    }
}

/// Creates a fresh runner when the caller did not provide one
#[async_trait]
pub trait QueryRunnerFactory: Send + Sync {
    async fn create_runner(&self) -> Result<Arc<dyn QueryRunner>, QueryObjectError>;
}

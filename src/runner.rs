//! Postgres-backed query runner
//!
//! Bridges the query-object runner contract onto a sqlx connection pool.
//! One runner holds at most one open transaction; statements run against
//! the transaction while it is pending and against the pool otherwise.

use async_trait::async_trait;
use query_object::{QueryObjectError, QueryRunner, QueryRunnerFactory, RawQueryResult};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Postgres, Row, Transaction, TypeInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// Shared parameter binding logic: JSON values are sniffed into the closest
// postgres type before binding
macro_rules! bind_json_param {
    ($query:expr, $param:expr) => {
        match $param {
            serde_json::Value::String(s) => {
                // Try to parse as RFC3339 timestamp first
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                    $query.bind(dt.with_timezone(&chrono::Utc))
                // Try to parse as UUID
                } else if let Ok(uuid) = uuid::Uuid::parse_str(s) {
                    $query.bind(uuid)
                } else {
                    $query.bind(s.clone())
                }
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        $query.bind(i as i32)
                    } else {
                        $query.bind(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    $query.bind(f)
                } else {
                    $query.bind(n.to_string())
                }
            }
            serde_json::Value::Bool(b) => $query.bind(*b),
            serde_json::Value::Null => $query.bind(Option::<String>::None),
            other => $query.bind(other.clone()),
        }
    };
}

fn database_error(error: sqlx::Error) -> QueryObjectError {
    QueryObjectError::Database(error.to_string())
}

/// Decode one row into a JSON object keyed by column name
fn row_to_json(row: &PgRow) -> Result<Value, QueryObjectError> {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)
                .map_err(database_error)?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::from(v as i64))
                .unwrap_or(Value::Null),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::from(v as i64))
                .unwrap_or(Value::Null),
            "INT8" => row
                .try_get::<Option<i64>, _>(index)
                .map_err(database_error)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::from(v as f64))
                .unwrap_or(Value::Null),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)
                .map_err(database_error)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::String(v.to_rfc3339()))
                .unwrap_or(Value::Null),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(index)
                .map_err(database_error)?
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(index)
                .map_err(database_error)?
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(Value::String)
                .unwrap_or(Value::Null),
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

/// Whether a statement produces rows
fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.contains(" RETURNING ")
}

/// Query runner over a sqlx postgres pool
pub struct PostgresQueryRunner {
    pool: PgPool,
    transaction: Mutex<Option<Transaction<'static, Postgres>>>,
    transaction_active: AtomicBool,
}

impl PostgresQueryRunner {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: Mutex::new(None),
            transaction_active: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl QueryRunner for PostgresQueryRunner {
    async fn query(
        &self,
        sql: &str,
        parameters: &[Value],
    ) -> Result<RawQueryResult, QueryObjectError> {
        debug_log!(sql = %sql, parameters = parameters.len(), "running statement");

        let mut query = sqlx::query(sql);
        for param in parameters {
            query = bind_json_param!(query, param);
        }

        let mut guard = self.transaction.lock().await;
        if returns_rows(sql) {
            let rows = match guard.as_mut() {
                Some(tx) => query.fetch_all(&mut **tx).await.map_err(database_error)?,
                None => query.fetch_all(&self.pool).await.map_err(database_error)?,
            };
            let decoded: Result<Vec<Value>, QueryObjectError> =
                rows.iter().map(row_to_json).collect();
            let rows = decoded?;
            let rows_affected = rows.len() as u64;
            Ok(RawQueryResult {
                rows,
                rows_affected,
            })
        } else {
            let result = match guard.as_mut() {
                Some(tx) => query.execute(&mut **tx).await.map_err(database_error)?,
                None => query.execute(&self.pool).await.map_err(database_error)?,
            };
            Ok(RawQueryResult {
                rows: Vec::new(),
                rows_affected: result.rows_affected(),
            })
        }
    }

    async fn start_transaction(&self) -> Result<(), QueryObjectError> {
        let mut guard = self.transaction.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let tx = self.pool.begin().await.map_err(database_error)?;
        *guard = Some(tx);
        self.transaction_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), QueryObjectError> {
        let mut guard = self.transaction.lock().await;
        if let Some(tx) = guard.take() {
            self.transaction_active.store(false, Ordering::SeqCst);
            tx.commit().await.map_err(database_error)?;
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), QueryObjectError> {
        let mut guard = self.transaction.lock().await;
        if let Some(tx) = guard.take() {
            self.transaction_active.store(false, Ordering::SeqCst);
            tx.rollback().await.map_err(database_error)?;
        }
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::SeqCst)
    }

    async fn release(&self) -> Result<(), QueryObjectError> {
        // dropping an uncommitted transaction rolls it back; the pooled
        // connection returns to the pool on drop
        let mut guard = self.transaction.lock().await;
        if guard.take().is_some() {
            self.transaction_active.store(false, Ordering::SeqCst);
            tracing::warn!("runner released with an open transaction, rolling back");
        }
        Ok(())
    }
}

/// Creates one fresh pool-backed runner per execution
pub struct PostgresRunnerFactory {
    pool: PgPool,
}

impl PostgresRunnerFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryRunnerFactory for PostgresRunnerFactory {
    async fn create_runner(&self) -> Result<Arc<dyn QueryRunner>, QueryObjectError> {
        Ok(Arc::new(PostgresQueryRunner::new(self.pool.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_rows_detection() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  select * from t"));
        assert!(returns_rows("INSERT INTO t (a) VALUES ($1) RETURNING id"));
        assert!(!returns_rows("UPDATE t SET a = $1"));
        assert!(!returns_rows("DELETE FROM t"));
    }
}

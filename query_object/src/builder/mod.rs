//! Query builders
//!
//! One builder per statement shape, all sharing the expression map, the
//! rendering helpers and the execution protocol in this module. Builders are
//! pure until `execute` is called; `get_query` renders SQL without touching
//! a connection.

use crate::dialect::Dialect;
use crate::errors::QueryObjectError;
use crate::expression::{QueryExpression, WhereCondition, WhereConnector};
use crate::metadata::EntityMetadata;
use crate::params::{bind_named_parameters, ParameterAllocator};
use crate::runner::{QueryRunner, QueryRunnerFactory};
use cache_system::prelude::QueryResultCache;
use serde_json::Value;
use signal_system::prelude::{Broadcaster, EntityEvent, EventAction};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod delete;
mod insert;
mod join;
mod relation;
mod select;
mod soft_delete;
mod update;

pub use delete::DeleteQueryBuilder;
pub use insert::InsertQueryBuilder;
pub use join::{JoinClause, JoinType};
pub use relation::RelationQueryBuilder;
pub use select::SelectQueryBuilder;
pub use soft_delete::{SoftDeleteKind, SoftDeleteQueryBuilder};
pub use update::UpdateQueryBuilder;

#[cfg(test)]
mod tests;

/// Shared wiring every builder carries
#[derive(Clone)]
pub struct QueryBuilderContext {
    pub dialect: Dialect,
    /// Caller-provided connection; when absent the factory creates one per
    /// execution and releases it afterwards
    pub runner: Option<Arc<dyn QueryRunner>>,
    pub runner_factory: Option<Arc<dyn QueryRunnerFactory>>,
    pub broadcaster: Option<Arc<Broadcaster>>,
    pub cache: Option<Arc<dyn QueryResultCache>>,
    /// Wrap the statement in a transaction unless one is already active
    pub use_transaction: bool,
}

impl fmt::Debug for QueryBuilderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilderContext")
            .field("dialect", &self.dialect)
            .field("has_runner", &self.runner.is_some())
            .field("has_factory", &self.runner_factory.is_some())
            .field("has_broadcaster", &self.broadcaster.is_some())
            .field("has_cache", &self.cache.is_some())
            .field("use_transaction", &self.use_transaction)
            .finish()
    }
}

impl QueryBuilderContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            runner: None,
            runner_factory: None,
            broadcaster: None,
            cache: None,
            use_transaction: false,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn QueryRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_runner_factory(mut self, factory: Arc<dyn QueryRunnerFactory>) -> Self {
        self.runner_factory = Some(factory);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn QueryResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn transactional(mut self) -> Self {
        self.use_transaction = true;
        self
    }
}

/// Normalized outcome of one executed builder
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QueryExecutionResult {
    /// Rows exactly as the driver returned them
    pub raw: Vec<Value>,
    pub affected: u64,
    /// Input entities merged with database-generated values, when reconciled
    pub entities: Vec<Value>,
}

/// How generated values flow back into the caller's entities
pub(crate) enum ReconcileStrategy {
    /// Returned rows come back with the mutating statement itself
    FromReturning { entities: Vec<Value> },
    /// The dialect cannot return rows; run a follow-up SELECT inside the
    /// same transaction
    FollowUpSelect {
        entities: Vec<Value>,
        sql: String,
        parameters: Vec<Value>,
    },
}

/// Lifecycle hooks to fire around the statement
pub(crate) struct BroadcastPlan {
    pub action: EventAction,
    pub table: String,
    pub entities: Vec<Value>,
}

/// Everything `execute_statement` needs for one builder execution
pub(crate) struct StatementPlan {
    pub sql: String,
    pub parameters: Vec<Value>,
    pub broadcast: Option<BroadcastPlan>,
    pub reconcile: Option<ReconcileStrategy>,
}

/// Merge returned rows into the input entities, index-wise
///
/// Row keys overwrite entity keys; entities without a matching row pass
/// through unchanged.
pub(crate) fn merge_rows(entities: &[Value], rows: &[Value]) -> Vec<Value> {
    entities
        .iter()
        .enumerate()
        .map(|(index, entity)| {
            let mut merged = entity.clone();
            if let (Some(object), Some(Value::Object(row))) =
                (merged.as_object_mut(), rows.get(index))
            {
                for (key, value) in row {
                    object.insert(key.clone(), value.clone());
                }
            }
            merged
        })
        .collect()
}

/// Render the WHERE chain of an expression map
///
/// `qualify` prefixes bare column names with the main alias; raw fragments
/// are passed through untouched.
pub(crate) fn render_wheres(
    expression: &QueryExpression,
    dialect: Dialect,
    qualify: Option<&str>,
    params: &mut ParameterAllocator,
) -> Result<String, QueryObjectError> {
    if expression.wheres.is_empty() {
        return Ok(String::new());
    }
    let mut sql = String::from(" WHERE ");
    for clause in &expression.wheres {
        match clause.connector {
            WhereConnector::Simple => {}
            WhereConnector::And => sql.push_str(" AND "),
            WhereConnector::Or => sql.push_str(" OR "),
        }
        match &clause.condition {
            WhereCondition::Raw(fragment) => sql.push_str(fragment),
            WhereCondition::Operator { column, operator } => {
                let reference = match qualify {
                    Some(alias) if !column.contains('.') => format!("{}.{}", alias, column),
                    _ => column.clone(),
                };
                sql.push_str(&operator.to_sql(dialect, &reference, params)?);
            }
        }
    }
    Ok(sql)
}

/// Render the ORDER BY clause, empty when no sort was requested
pub(crate) fn render_order_by(expression: &QueryExpression, qualify: Option<&str>) -> String {
    if expression.order_bys.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = expression
        .order_bys
        .iter()
        .map(|(column, spec)| {
            let reference = match qualify {
                Some(alias) if !column.contains('.') => format!("{}.{}", alias, column),
                _ => column.clone(),
            };
            match spec.nulls {
                Some(nulls) => format!("{} {} {}", reference, spec.order.to_sql(), nulls.to_sql()),
                None => format!("{} {}", reference, spec.order.to_sql()),
            }
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// Build a WHERE fragment matching entities by their primary key values
///
/// Single-column keys render as one IN list; composite keys render as OR'd
/// conjunction groups.
pub(crate) fn entity_key_predicate(
    metadata: &EntityMetadata,
    entities: &[Value],
    params: &mut ParameterAllocator,
) -> Result<Option<String>, QueryObjectError> {
    let primary = metadata.primary_columns();
    if primary.is_empty() || entities.is_empty() {
        return Ok(None);
    }
    if primary.len() == 1 {
        let column = &primary[0].name;
        let tokens: Vec<String> = entities
            .iter()
            .map(|entity| params.push(entity.get(column).cloned().unwrap_or(Value::Null)))
            .collect();
        return Ok(Some(format!("{} IN ({})", column, tokens.join(", "))));
    }
    let groups: Vec<String> = entities
        .iter()
        .map(|entity| {
            let parts: Vec<String> = primary
                .iter()
                .map(|column| {
                    let token =
                        params.push(entity.get(&column.name).cloned().unwrap_or(Value::Null));
                    format!("{} = {}", column.name, token)
                })
                .collect();
            format!("({})", parts.join(" AND "))
        })
        .collect();
    Ok(Some(groups.join(" OR ")))
}

/// Push an IN predicate over the primary key for a set of scalar ids
pub(crate) fn push_where_in_ids(
    expression: &mut QueryExpression,
    ids: Vec<Value>,
) -> Result<(), QueryObjectError> {
    let metadata = expression
        .metadata
        .clone()
        .ok_or_else(|| QueryObjectError::MissingConfiguration("entity metadata".to_string()))?;
    let primary = metadata.primary_columns();
    if primary.len() != 1 {
        return Err(QueryObjectError::InvalidIdentifier {
            relation: metadata.table_name.clone(),
        });
    }
    expression.push_where(
        WhereConnector::And,
        WhereCondition::Operator {
            column: primary[0].name.clone(),
            operator: crate::operator::Operator::r#in(ids),
        },
    );
    Ok(())
}

struct AcquiredRunner {
    runner: Arc<dyn QueryRunner>,
    owned: bool,
}

async fn acquire_runner(
    context: &QueryBuilderContext,
) -> Result<AcquiredRunner, QueryObjectError> {
    if let Some(runner) = &context.runner {
        return Ok(AcquiredRunner {
            runner: runner.clone(),
            owned: false,
        });
    }
    let factory = context.runner_factory.as_ref().ok_or_else(|| {
        QueryObjectError::MissingConfiguration("query runner or runner factory".to_string())
    })?;
    Ok(AcquiredRunner {
        runner: factory.create_runner().await?,
        owned: true,
    })
}

/// Roll back a transaction this execution opened, swallowing the rollback's
/// own failure so the original error survives
async fn rollback_owned(runner: &Arc<dyn QueryRunner>) {
    if let Err(rollback_error) = runner.rollback_transaction().await {
        tracing::warn!(error = %rollback_error, "rollback after failed statement also failed");
    }
}

/// Execute one planned statement under the full protocol
///
/// Acquires a runner, opens a transaction when requested and none is active,
/// fires before-hooks, runs the statement, reconciles generated values,
/// fires after-hooks and commits. A runner created here is released on every
/// path; a caller-provided runner and an already-active transaction are left
/// untouched.
pub(crate) async fn execute_statement(
    context: &QueryBuilderContext,
    plan: StatementPlan,
) -> Result<QueryExecutionResult, QueryObjectError> {
    let acquired = acquire_runner(context).await?;
    let runner = acquired.runner.clone();

    let owns_transaction = context.use_transaction && !runner.is_transaction_active();
    if owns_transaction {
        if let Err(error) = runner.start_transaction().await {
            if acquired.owned {
                let _ = runner.release().await;
            }
            return Err(error);
        }
    }

    let outcome = run_statement_body(context, &runner, plan, owns_transaction).await;

    let outcome = match outcome {
        Ok(result) => {
            if owns_transaction {
                match runner.commit_transaction().await {
                    Ok(()) => Ok(result),
                    Err(error) => {
                        rollback_owned(&runner).await;
                        Err(error)
                    }
                }
            } else {
                Ok(result)
            }
        }
        Err(error) => {
            if owns_transaction {
                rollback_owned(&runner).await;
            }
            Err(error)
        }
    };

    // Flush only once no transaction is pending on this connection
    if outcome.is_ok() && !runner.is_transaction_active() {
        if let Err(flush_error) = runner.flush().await {
            tracing::warn!(error = %flush_error, "post-commit flush failed");
        }
    }

    if acquired.owned {
        let release = runner.release().await;
        if outcome.is_ok() {
            release?;
        }
    }

    outcome
}

async fn run_statement_body(
    context: &QueryBuilderContext,
    runner: &Arc<dyn QueryRunner>,
    plan: StatementPlan,
    _owns_transaction: bool,
) -> Result<QueryExecutionResult, QueryObjectError> {
    tracing::debug!(sql = %plan.sql, parameters = plan.parameters.len(), "executing statement");

    if let (Some(broadcaster), Some(broadcast)) = (&context.broadcaster, &plan.broadcast) {
        let event = EntityEvent::new(broadcast.action, broadcast.table.clone())
            .with_entities(broadcast.entities.clone());
        broadcaster.broadcast_before(&event).await;
    }

    let raw = runner.query(&plan.sql, &plan.parameters).await?;

    let mut result = QueryExecutionResult {
        raw: raw.rows.clone(),
        affected: raw.rows_affected,
        entities: Vec::new(),
    };

    match plan.reconcile {
        Some(ReconcileStrategy::FromReturning { entities }) => {
            result.entities = merge_rows(&entities, &raw.rows);
        }
        Some(ReconcileStrategy::FollowUpSelect {
            entities,
            sql,
            parameters,
        }) => {
            let follow_up = runner.query(&sql, &parameters).await?;
            result.entities = merge_rows(&entities, &follow_up.rows);
        }
        None => {}
    }

    if let (Some(broadcaster), Some(broadcast)) = (&context.broadcaster, &plan.broadcast) {
        let after_entities = if result.entities.is_empty() {
            broadcast.entities.clone()
        } else {
            result.entities.clone()
        };
        let event = EntityEvent::new(broadcast.action, broadcast.table.clone())
            .with_entities(after_entities);
        broadcaster.broadcast_after(&event).await;
    }

    Ok(result)
}

/// Render a named-parameter statement down to driver-ready positional form
pub(crate) fn finalize_parameters(
    sql: &str,
    parameters: &HashMap<String, Value>,
    native_parameters: &HashMap<String, Value>,
    dialect: Dialect,
) -> Result<(String, Vec<Value>), QueryObjectError> {
    let mut bag = parameters.clone();
    for (name, value) in native_parameters {
        bag.insert(name.clone(), value.clone());
    }
    bind_named_parameters(sql, &bag, dialect)
}

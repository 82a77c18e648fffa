//! Soft-delete and restore builder
//!
//! Renders an UPDATE that sets or clears the mapped delete-date column.
//! Requires entity metadata with a declared delete-date column; the check
//! fires before any SQL is produced.

use super::{
    entity_key_predicate, execute_statement, finalize_parameters, push_where_in_ids,
    render_order_by, render_wheres, BroadcastPlan, QueryBuilderContext, QueryExecutionResult,
    ReconcileStrategy, StatementPlan,
};
use crate::dialect::ReturningSupport;
use crate::errors::QueryObjectError;
use crate::expression::{
    CellValue, OrderBySpec, QueryExpression, QueryType, WhereCondition, WhereConnector,
};
use crate::metadata::{DeleteDateValue, EntityMetadata};
use crate::operator::Operator;
use crate::params::ParameterAllocator;
use serde_json::Value;
use signal_system::prelude::EventAction;
use std::collections::HashMap;
use std::sync::Arc;

/// Whether the builder marks rows deleted or brings them back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteKind {
    SoftDelete,
    Restore,
}

/// Fluent soft-delete / restore builder
#[derive(Debug)]
pub struct SoftDeleteQueryBuilder {
    context: QueryBuilderContext,
    expression: QueryExpression,
    metadata: Arc<EntityMetadata>,
    kind: SoftDeleteKind,
}

impl SoftDeleteQueryBuilder {
    pub fn new(
        context: QueryBuilderContext,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
        kind: SoftDeleteKind,
    ) -> Self {
        let query_type = match kind {
            SoftDeleteKind::SoftDelete => QueryType::SoftDelete,
            SoftDeleteKind::Restore => QueryType::Restore,
        };
        let mut expression = QueryExpression::for_query(query_type, table);
        expression.metadata = Some(metadata.clone());
        Self {
            context,
            expression,
            metadata,
            kind,
        }
    }

    pub fn where_raw(mut self, fragment: impl Into<String>) -> Self {
        self.expression.wheres.clear();
        self.expression
            .push_where(WhereConnector::Simple, WhereCondition::Raw(fragment.into()));
        self
    }

    pub fn and_where(mut self, fragment: impl Into<String>) -> Self {
        self.expression
            .push_where(WhereConnector::And, WhereCondition::Raw(fragment.into()));
        self
    }

    pub fn and_where_op(mut self, column: impl Into<String>, operator: Operator) -> Self {
        self.expression.push_where(
            WhereConnector::And,
            WhereCondition::Operator {
                column: column.into(),
                operator,
            },
        );
        self
    }

    /// Match rows by primary key values
    pub fn where_in_ids(mut self, ids: Vec<Value>) -> Result<Self, QueryObjectError> {
        push_where_in_ids(&mut self.expression, ids)?;
        Ok(self)
    }

    /// Match rows by the primary keys of entity objects
    pub fn where_entities(mut self, entities: Vec<Value>) -> Self {
        self.expression.where_entities.extend(entities);
        self
    }

    pub fn set_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.expression.parameters.insert(name.into(), value);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, spec: OrderBySpec) -> Self {
        self.expression.order_bys.push((column.into(), spec));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.expression.limit = Some(limit);
        self
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expression.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// The delete-date cell: a declared literal becomes a parameter, a
    /// declared factory supplies a raw expression, otherwise the engine's
    /// now expression is used. Restore always clears to NULL.
    fn delete_date_cell(
        &self,
        metadata: &EntityMetadata,
    ) -> Result<(String, CellValue), QueryObjectError> {
        let column = metadata
            .delete_date_column()
            .ok_or_else(|| QueryObjectError::MissingDeleteDateColumn(metadata.table_name.clone()))?;
        let cell = match self.kind {
            SoftDeleteKind::Restore => CellValue::Expression("NULL".to_string()),
            SoftDeleteKind::SoftDelete => match &column.delete_date_value {
                Some(DeleteDateValue::Literal(value)) => {
                    CellValue::Literal(Value::String(value.clone()))
                }
                Some(DeleteDateValue::Factory(factory)) => CellValue::Expression(factory()),
                None => {
                    CellValue::Expression(self.context.dialect.now_expression().to_string())
                }
            },
        };
        Ok((column.name.clone(), cell))
    }

    fn render(&self) -> Result<(String, HashMap<String, Value>), QueryObjectError> {
        let dialect = self.context.dialect;
        let metadata = self.metadata.clone();
        let mut params = ParameterAllocator::new();

        let mut sets = vec![self.delete_date_cell(&metadata)?];
        if let Some(version) = metadata.version_column() {
            sets.push((
                version.name.clone(),
                CellValue::Expression(format!("{} + 1", version.name)),
            ));
        }
        if let Some(update_date) = metadata.update_date_column() {
            sets.push((
                update_date.name.clone(),
                CellValue::Expression(dialect.now_expression().to_string()),
            ));
        }

        let fragments: Vec<String> = sets
            .iter()
            .map(|(column, cell)| match cell {
                CellValue::Literal(value) => {
                    format!("{} = {}", column, params.push(value.clone()))
                }
                CellValue::Expression(expression) => format!("{} = {}", column, expression),
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.expression.main_table,
            fragments.join(", ")
        );

        if !self.expression.returning.is_empty() {
            match dialect.returning_support() {
                ReturningSupport::Output => {
                    let outputs: Vec<String> = self
                        .expression
                        .returning
                        .iter()
                        .map(|column| format!("INSERTED.{}", column))
                        .collect();
                    sql.push_str(&format!(" OUTPUT {}", outputs.join(", ")));
                }
                ReturningSupport::Returning => {}
                ReturningSupport::Unsupported => {
                    return Err(QueryObjectError::capability(
                        dialect,
                        "RETURNING clauses on soft delete",
                    ))
                }
            }
        }

        let mut wheres = render_wheres(&self.expression, dialect, None, &mut params)?;
        if !self.expression.where_entities.is_empty() {
            if let Some(predicate) =
                entity_key_predicate(&metadata, &self.expression.where_entities, &mut params)?
            {
                if wheres.is_empty() {
                    wheres = format!(" WHERE {}", predicate);
                } else {
                    wheres.push_str(&format!(" AND ({})", predicate));
                }
            }
        }
        sql.push_str(&wheres);

        if !self.expression.order_bys.is_empty() || self.expression.limit.is_some() {
            if !dialect.supports_limit_on_update() {
                return Err(QueryObjectError::capability(
                    dialect,
                    "ORDER BY / LIMIT on soft delete",
                ));
            }
            sql.push_str(&render_order_by(&self.expression, None));
            if let Some(limit) = self.expression.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }
        }

        if !self.expression.returning.is_empty()
            && dialect.returning_support() == ReturningSupport::Returning
        {
            sql.push_str(&format!(" RETURNING {}", self.expression.returning.join(", ")));
        }

        let mut bag = self.expression.parameters.clone();
        params.merge_into(&mut bag);
        Ok((sql, bag))
    }

    pub fn get_query(&self) -> Result<String, QueryObjectError> {
        Ok(self.render()?.0)
    }

    pub fn get_query_and_parameters(&self) -> Result<(String, Vec<Value>), QueryObjectError> {
        let (sql, bag) = self.render()?;
        finalize_parameters(
            &sql,
            &bag,
            &self.expression.native_parameters,
            self.context.dialect,
        )
    }

    pub async fn execute(&self) -> Result<QueryExecutionResult, QueryObjectError> {
        let (sql, parameters) = self.get_query_and_parameters()?;

        let action = match self.kind {
            SoftDeleteKind::SoftDelete => EventAction::SoftRemove,
            SoftDeleteKind::Restore => EventAction::Recover,
        };

        let reconcile = if !self.expression.returning.is_empty()
            && !self.expression.where_entities.is_empty()
        {
            Some(ReconcileStrategy::FromReturning {
                entities: self.expression.where_entities.clone(),
            })
        } else {
            self.follow_up_reconcile()?
        };

        execute_statement(
            &self.context,
            StatementPlan {
                sql,
                parameters,
                broadcast: Some(BroadcastPlan {
                    action,
                    table: self.expression.main_table.clone(),
                    entities: self.expression.where_entities.clone(),
                }),
                reconcile,
            },
        )
        .await
    }

    /// Dialects without RETURNING reconcile through a follow-up SELECT so
    /// callers still observe the new delete-date value
    fn follow_up_reconcile(&self) -> Result<Option<ReconcileStrategy>, QueryObjectError> {
        if self.expression.where_entities.is_empty()
            || self.context.dialect.supports_returning()
        {
            return Ok(None);
        }
        let metadata = self.metadata.clone();
        let mut params = ParameterAllocator::new();
        let Some(predicate) =
            entity_key_predicate(&metadata, &self.expression.where_entities, &mut params)?
        else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            self.expression.main_table, predicate
        );
        let mut bag = HashMap::new();
        params.merge_into(&mut bag);
        let (sql, parameters) = finalize_parameters(
            &sql,
            &bag,
            &self.expression.native_parameters,
            self.context.dialect,
        )?;
        Ok(Some(ReconcileStrategy::FollowUpSelect {
            entities: self.expression.where_entities.clone(),
            sql,
            parameters,
        }))
    }
}

//! DELETE builder

use super::{
    entity_key_predicate, execute_statement, finalize_parameters, push_where_in_ids,
    render_wheres, BroadcastPlan, QueryBuilderContext, QueryExecutionResult, ReconcileStrategy,
    StatementPlan,
};
use crate::dialect::ReturningSupport;
use crate::errors::QueryObjectError;
use crate::expression::{QueryExpression, QueryType, WhereCondition, WhereConnector};
use crate::metadata::EntityMetadata;
use crate::operator::Operator;
use crate::params::ParameterAllocator;
use serde_json::Value;
use signal_system::prelude::EventAction;
use std::collections::HashMap;
use std::sync::Arc;

/// Fluent DELETE builder
#[derive(Debug)]
pub struct DeleteQueryBuilder {
    context: QueryBuilderContext,
    expression: QueryExpression,
}

impl DeleteQueryBuilder {
    pub fn new(context: QueryBuilderContext, table: impl Into<String>) -> Self {
        Self {
            context,
            expression: QueryExpression::for_query(QueryType::Delete, table),
        }
    }

    pub fn with_metadata(
        context: QueryBuilderContext,
        table: impl Into<String>,
        metadata: Arc<EntityMetadata>,
    ) -> Self {
        let mut builder = Self::new(context, table);
        builder.expression.metadata = Some(metadata);
        builder
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

    /// Columns to read back from the deleted rows
    pub fn returning(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expression.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    fn render(&self) -> Result<(String, HashMap<String, Value>), QueryObjectError> {
        let dialect = self.context.dialect;
        let mut params = ParameterAllocator::new();

        let mut sql = format!("DELETE FROM {}", self.expression.main_table);

        // OUTPUT reads the pre-delete row image, it sits before WHERE
        if !self.expression.returning.is_empty() {
            match dialect.returning_support() {
                ReturningSupport::Output => {
                    let outputs: Vec<String> = self
                        .expression
                        .returning
                        .iter()
                        .map(|column| format!("DELETED.{}", column))
                        .collect();
                    sql.push_str(&format!(" OUTPUT {}", outputs.join(", ")));
                }
                ReturningSupport::Returning => {}
                ReturningSupport::Unsupported => {
                    return Err(QueryObjectError::capability(
                        dialect,
                        "RETURNING clauses on DELETE",
                    ))
                }
            }
        }

        let mut wheres = render_wheres(&self.expression, dialect, None, &mut params)?;
        if let Some(metadata) = &self.expression.metadata {
            if !self.expression.where_entities.is_empty() {
                if let Some(predicate) =
                    entity_key_predicate(metadata, &self.expression.where_entities, &mut params)?
                {
                    if wheres.is_empty() {
                        wheres = format!(" WHERE {}", predicate);
                    } else {
                        wheres.push_str(&format!(" AND ({})", predicate));
                    }
                }
            }
        }
        sql.push_str(&wheres);

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

        // Deleted rows only come back through RETURNING; there is nothing
        // left to select afterwards
        let reconcile = if !self.expression.returning.is_empty()
            && !self.expression.where_entities.is_empty()
        {
            Some(ReconcileStrategy::FromReturning {
                entities: self.expression.where_entities.clone(),
            })
        } else {
            None
        };

        execute_statement(
            &self.context,
            StatementPlan {
                sql,
                parameters,
                broadcast: Some(BroadcastPlan {
                    action: EventAction::Remove,
                    table: self.expression.main_table.clone(),
                    entities: self.expression.where_entities.clone(),
                }),
                reconcile,
            },
        )
        .await
    }
}

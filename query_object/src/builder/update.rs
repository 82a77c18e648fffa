//! UPDATE builder

use super::{
    entity_key_predicate, execute_statement, finalize_parameters, render_order_by, render_wheres,
    push_where_in_ids, BroadcastPlan, QueryBuilderContext, QueryExecutionResult,
    ReconcileStrategy, StatementPlan,
};
use crate::dialect::ReturningSupport;
use crate::errors::QueryObjectError;
use crate::expression::{
    CellValue, OrderBySpec, QueryExpression, QueryType, WhereCondition, WhereConnector,
};
use crate::metadata::{ColumnRole, EntityMetadata};
use crate::operator::Operator;
use crate::params::ParameterAllocator;
use serde_json::Value;
use signal_system::prelude::EventAction;
use std::collections::HashMap;
use std::sync::Arc;

/// Fluent UPDATE builder
///
/// When the values come from a mapped entity, version and update-date
/// columns are bumped automatically.
#[derive(Debug)]
pub struct UpdateQueryBuilder {
    context: QueryBuilderContext,
    expression: QueryExpression,
    /// SET cells in insertion order, rendering is deterministic
    sets: Vec<(String, CellValue)>,
}

impl UpdateQueryBuilder {
    pub fn new(context: QueryBuilderContext, table: impl Into<String>) -> Self {
        Self {
            context,
            expression: QueryExpression::for_query(QueryType::Update, table),
            sets: Vec::new(),
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

    /// Set one column
    pub fn set(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push_set(column.into(), value.into());
        self
    }

    fn push_set(&mut self, column: String, value: CellValue) {
        if let Some(existing) = self.sets.iter_mut().find(|(name, _)| *name == column) {
            existing.1 = value;
        } else {
            self.sets.push((column, value));
        }
    }

    /// Take SET values from a mapped entity, enabling auto columns
    ///
    /// Primary key, delete-date, update-date and version columns are never
    /// copied from the entity; keys are applied in sorted order so renders
    /// stay deterministic.
    pub fn set_entity(mut self, entity: Value) -> Self {
        if let Value::Object(object) = &entity {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(metadata) = &self.expression.metadata {
                    let skip = metadata.columns.iter().any(|column| {
                        column.name == *key
                            && (column.is_primary || column.role != ColumnRole::Regular)
                    });
                    if skip {
                        continue;
                    }
                }
                self.push_set(key.clone(), CellValue::Literal(object[key].clone()));
            }
        }
        self.expression.update_entity = true;
        self.expression.where_entities.push(entity);
        self
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

    /// SET fragments including automatic version / update-date columns
    fn resolve_sets(&self) -> Result<Vec<(String, CellValue)>, QueryObjectError> {
        let mut sets = self.sets.clone();
        if self.expression.update_entity {
            if let Some(metadata) = &self.expression.metadata {
                if let Some(version) = metadata.version_column() {
                    if !sets.iter().any(|(name, _)| *name == version.name) {
                        sets.push((
                            version.name.clone(),
                            CellValue::Expression(format!("{} + 1", version.name)),
                        ));
                    }
                }
                if let Some(update_date) = metadata.update_date_column() {
                    if !sets.iter().any(|(name, _)| *name == update_date.name) {
                        sets.push((
                            update_date.name.clone(),
                            CellValue::Expression(
                                self.context.dialect.now_expression().to_string(),
                            ),
                        ));
                    }
                }
            }
        }
        if sets.is_empty() {
            return Err(QueryObjectError::UpdateValuesMissing);
        }
        Ok(sets)
    }

    fn render(&self) -> Result<(String, HashMap<String, Value>), QueryObjectError> {
        let dialect = self.context.dialect;
        let mut params = ParameterAllocator::new();
        let sets = self.resolve_sets()?;

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
                        "RETURNING clauses on UPDATE",
                    ))
                }
            }
        }

        let mut wheres = render_wheres(&self.expression, dialect, None, &mut params)?;
        if let (Some(metadata), false) = (
            &self.expression.metadata,
            self.expression.where_entities.is_empty(),
        ) {
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
        sql.push_str(&wheres);

        if !self.expression.order_bys.is_empty() || self.expression.limit.is_some() {
            if !dialect.supports_limit_on_update() {
                return Err(QueryObjectError::capability(
                    dialect,
                    "ORDER BY / LIMIT on UPDATE",
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
                    action: EventAction::Update,
                    table: self.expression.main_table.clone(),
                    entities: self.expression.where_entities.clone(),
                }),
                reconcile,
            },
        )
        .await
    }

    fn follow_up_reconcile(&self) -> Result<Option<ReconcileStrategy>, QueryObjectError> {
        let Some(metadata) = &self.expression.metadata else {
            return Ok(None);
        };
        if self.expression.where_entities.is_empty()
            || !self.expression.update_entity
            || self.context.dialect.supports_returning()
        {
            return Ok(None);
        }
        let mut params = ParameterAllocator::new();
        let Some(predicate) =
            entity_key_predicate(metadata, &self.expression.where_entities, &mut params)?
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

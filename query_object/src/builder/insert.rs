//! INSERT builder with upsert support

use super::{
    entity_key_predicate, execute_statement, finalize_parameters, BroadcastPlan,
    QueryBuilderContext, QueryExecutionResult, ReconcileStrategy, StatementPlan,
};
use crate::dialect::{ConflictSyntax, MissingValuePolicy, ReturningSupport};
use crate::errors::QueryObjectError;
use crate::expression::{CellValue, QueryExpression, QueryType};
use crate::metadata::EntityMetadata;
use crate::params::ParameterAllocator;
use serde_json::Value;
use signal_system::prelude::EventAction;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Fluent INSERT builder
#[derive(Debug)]
pub struct InsertQueryBuilder {
    context: QueryBuilderContext,
    expression: QueryExpression,
    columns: Vec<String>,
    rows: Vec<HashMap<String, CellValue>>,
    /// Original entity objects, kept for hooks and reconciliation
    entities: Vec<Value>,
}

impl InsertQueryBuilder {
    pub fn new(context: QueryBuilderContext, table: impl Into<String>) -> Self {
        Self {
            context,
            expression: QueryExpression::for_query(QueryType::Insert, table),
            columns: Vec::new(),
            rows: Vec::new(),
            entities: Vec::new(),
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

    /// Explicit insert column list, overrides inference
    pub fn columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Insert entity objects; each JSON object becomes one row
    pub fn values(mut self, entities: Vec<Value>) -> Self {
        for entity in &entities {
            let mut row = HashMap::new();
            if let Value::Object(object) = entity {
                for (key, value) in object {
                    row.insert(key.clone(), CellValue::Literal(value.clone()));
                }
            }
            self.rows.push(row);
        }
        self.entities.extend(entities);
        self
    }

    /// Insert one row of explicit cells, expressions allowed
    pub fn value_map(mut self, row: HashMap<String, CellValue>) -> Self {
        let mut entity = serde_json::Map::new();
        for (key, cell) in &row {
            if let CellValue::Literal(value) = cell {
                entity.insert(key.clone(), value.clone());
            }
        }
        self.entities.push(Value::Object(entity));
        self.rows.push(row);
        self
    }

    /// Conflict target columns for the upsert clause
    pub fn on_conflict(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expression.on_conflict = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Skip conflicting rows instead of failing
    pub fn or_ignore(mut self) -> Self {
        self.expression.on_ignore = true;
        self
    }

    /// Overwrite the named columns when a conflict occurs
    pub fn or_update(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expression.on_update = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Columns to read back from the inserted rows
    pub fn returning(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expression.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Insert column list: explicit, else mapped non-generated columns, else
    /// the sorted union of row keys
    fn resolve_columns(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        if let Some(metadata) = &self.expression.metadata {
            return metadata
                .insert_columns()
                .iter()
                .map(|c| c.name.clone())
                .collect();
        }
        let mut keys = BTreeSet::new();
        for row in &self.rows {
            keys.extend(row.keys().cloned());
        }
        keys.into_iter().collect()
    }

    fn render_upsert(&self, columns: &[String]) -> Result<String, QueryObjectError> {
        if !self.expression.on_ignore && self.expression.on_update.is_empty() {
            return Ok(String::new());
        }
        match self.context.dialect.conflict_syntax() {
            ConflictSyntax::OnConflict => {
                if self.expression.on_ignore {
                    return Ok(" ON CONFLICT DO NOTHING".to_string());
                }
                if self.expression.on_conflict.is_empty() {
                    return Err(QueryObjectError::MissingConfiguration(
                        "conflict target columns for ON CONFLICT DO UPDATE".to_string(),
                    ));
                }
                let updates: Vec<String> = self
                    .expression
                    .on_update
                    .iter()
                    .map(|column| format!("{} = EXCLUDED.{}", column, column))
                    .collect();
                Ok(format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    self.expression.on_conflict.join(", "),
                    updates.join(", ")
                ))
            }
            ConflictSyntax::OnDuplicateKey => {
                if self.expression.on_ignore {
                    // rendered as INSERT IGNORE in the statement head
                    return Ok(String::new());
                }
                let source: Vec<&String> = if self.expression.on_update.is_empty() {
                    columns.iter().collect()
                } else {
                    self.expression.on_update.iter().collect()
                };
                let updates: Vec<String> = source
                    .iter()
                    .map(|column| format!("{} = VALUES({})", column, column))
                    .collect();
                Ok(format!(" ON DUPLICATE KEY UPDATE {}", updates.join(", ")))
            }
            ConflictSyntax::Unsupported => Err(QueryObjectError::capability(
                self.context.dialect,
                "upsert clauses",
            )),
        }
    }

    fn render(&self) -> Result<(String, HashMap<String, Value>), QueryObjectError> {
        if self.rows.is_empty() {
            return Err(QueryObjectError::MissingConfiguration(
                "insert values".to_string(),
            ));
        }
        let mut params = ParameterAllocator::new();
        let columns = self.resolve_columns();
        let dialect = self.context.dialect;

        let keyword = if self.expression.on_ignore
            && dialect.conflict_syntax() == ConflictSyntax::OnDuplicateKey
        {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let mut sql = format!(
            "{} {} ({})",
            keyword,
            self.expression.main_table,
            columns.join(", ")
        );

        // OUTPUT sits between the column list and VALUES
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
                        "RETURNING clauses on INSERT",
                    ))
                }
            }
        }

        let mut row_fragments = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut cells = Vec::with_capacity(columns.len());
            for column in &columns {
                match row.get(column) {
                    Some(CellValue::Literal(value)) => cells.push(params.push(value.clone())),
                    Some(CellValue::Expression(expression)) => cells.push(expression.clone()),
                    None => match dialect.missing_value_policy() {
                        MissingValuePolicy::Null => cells.push("NULL".to_string()),
                        MissingValuePolicy::DefaultKeyword => cells.push("DEFAULT".to_string()),
                    },
                }
            }
            row_fragments.push(format!("({})", cells.join(", ")));
        }
        sql.push_str(&format!(" VALUES {}", row_fragments.join(", ")));

        sql.push_str(&self.render_upsert(&columns)?);

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

    /// Execute the insert; generated values are merged back into `entities`
    /// when the dialect can return them
    pub async fn execute(&self) -> Result<QueryExecutionResult, QueryObjectError> {
        let (sql, parameters) = self.get_query_and_parameters()?;

        let reconcile = if !self.expression.returning.is_empty() && !self.entities.is_empty() {
            Some(ReconcileStrategy::FromReturning {
                entities: self.entities.clone(),
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
                    action: EventAction::Insert,
                    table: self.expression.main_table.clone(),
                    entities: self.entities.clone(),
                }),
                reconcile,
            },
        )
        .await
    }

    /// A follow-up SELECT works only when every inserted entity already
    /// carries its primary key
    fn follow_up_reconcile(&self) -> Result<Option<ReconcileStrategy>, QueryObjectError> {
        let Some(metadata) = &self.expression.metadata else {
            return Ok(None);
        };
        if self.entities.is_empty() || self.context.dialect.supports_returning() {
            return Ok(None);
        }
        let primary = metadata.primary_columns();
        let keys_known = !primary.is_empty()
            && self.entities.iter().all(|entity| {
                primary
                    .iter()
                    .all(|column| entity.get(&column.name).is_some_and(|v| !v.is_null()))
            });
        if !keys_known {
            return Ok(None);
        }

        let mut params = ParameterAllocator::new();
        let predicate = entity_key_predicate(metadata, &self.entities, &mut params)?;
        let Some(predicate) = predicate else {
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
            entities: self.entities.clone(),
            sql,
            parameters,
        }))
    }
}

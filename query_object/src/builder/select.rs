//! SELECT builder

use super::{
    execute_statement, finalize_parameters, render_order_by, render_wheres, QueryBuilderContext,
    StatementPlan,
};
use crate::errors::QueryObjectError;
use crate::expression::{
    NullsOrder, OrderBySpec, QueryExpression, QueryType, SortOrder, WhereCondition,
    WhereConnector,
};
use crate::metadata::EntityMetadata;
use crate::operator::Operator;
use crate::params::ParameterAllocator;
use cache_system::prelude::{CacheEntry, CacheOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::join::JoinClause;

/// Fluent SELECT builder
///
/// Mutators consume and return `self`; rendering is deterministic, so the
/// same builder always produces the same SQL.
#[derive(Debug)]
pub struct SelectQueryBuilder {
    context: QueryBuilderContext,
    expression: QueryExpression,
    selects: Vec<String>,
    joins: Vec<JoinClause>,
    cache_options: Option<CacheOptions>,
}

impl SelectQueryBuilder {
    pub fn new(context: QueryBuilderContext, table: impl Into<String>) -> Self {
        Self {
            context,
            expression: QueryExpression::for_query(QueryType::Select, table),
            selects: Vec::new(),
            joins: Vec::new(),
            cache_options: None,
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

    /// Alias used for the main table in rendered references
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.expression.main_alias = alias.into();
        self
    }

    /// Replace the select list
    pub fn select(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.selects = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one select expression
    pub fn add_select(mut self, column: impl Into<String>) -> Self {
        self.selects.push(column.into());
        self
    }

    pub fn join(mut self, clause: JoinClause) -> Self {
        self.joins.push(clause);
        self
    }

    /// Replace the where chain with one raw predicate
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

    pub fn or_where(mut self, fragment: impl Into<String>) -> Self {
        self.expression
            .push_where(WhereConnector::Or, WhereCondition::Raw(fragment.into()));
        self
    }

    /// AND a column predicate expressed through the operator tree
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

    pub fn or_where_op(mut self, column: impl Into<String>, operator: Operator) -> Self {
        self.expression.push_where(
            WhereConnector::Or,
            WhereCondition::Operator {
                column: column.into(),
                operator,
            },
        );
        self
    }

    /// Bind a named parameter referenced by a raw fragment
    pub fn set_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.expression.parameters.insert(name.into(), value);
        self
    }

    /// Bind a driver-ready value, overriding a same-named parameter
    pub fn set_native_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.expression.native_parameters.insert(name.into(), value);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.expression.order_bys.clear();
        self.expression.order_bys.push((
            column.into(),
            OrderBySpec {
                order,
                nulls: None,
            },
        ));
        self
    }

    pub fn add_order_by(mut self, column: impl Into<String>, spec: OrderBySpec) -> Self {
        self.expression.order_bys.push((column.into(), spec));
        self
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        if let Some(last) = self.expression.order_bys.last_mut() {
            last.1.nulls = Some(nulls);
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.expression.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.expression.offset = Some(offset);
        self
    }

    /// Entity-aware alias for limit, wins over `limit` when both are set
    pub fn take(mut self, take: u64) -> Self {
        self.expression.take = Some(take);
        self
    }

    /// Entity-aware alias for offset, wins over `offset` when both are set
    pub fn skip(mut self, skip: u64) -> Self {
        self.expression.skip = Some(skip);
        self
    }

    /// Cache the result under an explicit identifier and TTL
    pub fn cache(mut self, options: CacheOptions) -> Self {
        self.cache_options = Some(options);
        self
    }

    /// Cache the result keyed by the rendered SQL
    pub fn cache_ms(mut self, duration_ms: u64) -> Self {
        self.cache_options = Some(CacheOptions::new(String::new(), duration_ms));
        self
    }

    fn render(&self) -> Result<(String, HashMap<String, Value>), QueryObjectError> {
        let mut params = ParameterAllocator::new();
        let alias = self.expression.main_alias.as_str();

        let select_list = if self.selects.is_empty() {
            format!("{}.*", alias)
        } else {
            self.selects.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", select_list, self.expression.main_table);
        if alias != self.expression.main_table {
            sql.push_str(&format!(" AS {}", alias));
        }
        for join in &self.joins {
            sql.push_str(&join.to_sql());
        }
        sql.push_str(&render_wheres(
            &self.expression,
            self.context.dialect,
            Some(alias),
            &mut params,
        )?);
        sql.push_str(&render_order_by(&self.expression, Some(alias)));
        sql.push_str(&self.context.dialect.pagination_clause(
            self.expression.effective_limit(),
            self.expression.effective_offset(),
        )?);

        let mut bag = self.expression.parameters.clone();
        params.merge_into(&mut bag);
        Ok((sql, bag))
    }

    /// Render the SQL with named parameter tokens, no side effects
    pub fn get_query(&self) -> Result<String, QueryObjectError> {
        Ok(self.render()?.0)
    }

    /// Render driver-ready SQL and the matching positional value array
    pub fn get_query_and_parameters(&self) -> Result<(String, Vec<Value>), QueryObjectError> {
        let (sql, bag) = self.render()?;
        finalize_parameters(
            &sql,
            &bag,
            &self.expression.native_parameters,
            self.context.dialect,
        )
    }

    /// Execute and return all rows
    pub async fn get_many(&self) -> Result<Vec<Value>, QueryObjectError> {
        let (sql, parameters) = self.get_query_and_parameters()?;

        let cache_key = self.cache_options.as_ref().map(|options| {
            if options.identifier.is_empty() {
                CacheOptions::new(sql.clone(), options.duration_ms)
            } else {
                options.clone()
            }
        });

        if let (Some(cache), Some(key)) = (&self.context.cache, &cache_key) {
            match cache.get_from_cache(key).await {
                Ok(Some(entry)) if !cache.is_expired(&entry) => {
                    tracing::debug!(identifier = %key.identifier, "query cache hit");
                    if let Value::Array(rows) = entry.result {
                        return Ok(rows);
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(error = %error, "cache lookup failed, querying database")
                }
            }
        }

        let result = execute_statement(
            &self.context,
            StatementPlan {
                sql: sql.clone(),
                parameters,
                broadcast: None,
                reconcile: None,
            },
        )
        .await?;

        if let (Some(cache), Some(key)) = (&self.context.cache, &cache_key) {
            let entry = CacheEntry::new(sql, Value::Array(result.raw.clone()), key.duration_ms);
            if let Err(error) = cache.store_in_cache(key, entry).await {
                tracing::warn!(error = %error, "failed to store query result in cache");
            }
        }

        Ok(result.raw)
    }

    /// Execute and return the first row, if any
    pub async fn get_one(&self) -> Result<Option<Value>, QueryObjectError> {
        let mut rows = self.get_many().await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    /// Execute a COUNT(*) over the current filters
    ///
    /// Ordering and pagination are ignored; the count covers every matching
    /// row.
    pub async fn get_count(&self) -> Result<u64, QueryObjectError> {
        let mut params = ParameterAllocator::new();
        let alias = self.expression.main_alias.as_str();

        let mut sql = format!("SELECT COUNT(*) AS total FROM {}", self.expression.main_table);
        if alias != self.expression.main_table {
            sql.push_str(&format!(" AS {}", alias));
        }
        for join in &self.joins {
            sql.push_str(&join.to_sql());
        }
        sql.push_str(&render_wheres(
            &self.expression,
            self.context.dialect,
            Some(alias),
            &mut params,
        )?);

        let mut bag = self.expression.parameters.clone();
        params.merge_into(&mut bag);
        let (sql, parameters) = finalize_parameters(
            &sql,
            &bag,
            &self.expression.native_parameters,
            self.context.dialect,
        )?;

        let result = execute_statement(
            &self.context,
            StatementPlan {
                sql,
                parameters,
                broadcast: None,
                reconcile: None,
            },
        )
        .await?;

        let count = result
            .raw
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(count)
    }
}

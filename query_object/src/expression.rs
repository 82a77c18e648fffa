//! The expression map
//!
//! One mutable state record shared by every builder kind. Builder methods
//! only write fields here; SQL rendering reads the finished map. Cloning the
//! map clones the builder's whole visible state.

use crate::metadata::EntityMetadata;
use crate::operator::Operator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Which statement shape a builder renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    SoftDelete,
    Restore,
    Relation,
}

/// How a where clause chains onto the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereConnector {
    /// First clause, no connective keyword
    Simple,
    And,
    Or,
}

/// One predicate of the WHERE chain
#[derive(Debug)]
pub enum WhereCondition {
    /// Verbatim SQL fragment, may reference named parameters
    Raw(String),
    /// Column matched through the operator tree
    Operator { column: String, operator: Operator },
}

#[derive(Debug)]
pub struct WhereClause {
    pub connector: WhereConnector,
    pub condition: WhereCondition,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Explicit null placement, omitted when unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    pub fn to_sql(self) -> &'static str {
        match self {
            NullsOrder::First => "NULLS FIRST",
            NullsOrder::Last => "NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBySpec {
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBySpec {
    pub fn asc() -> Self {
        Self {
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn desc() -> Self {
        Self {
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// An INSERT / UPDATE cell: either a parameterized literal or inline SQL
#[derive(Debug, Clone)]
pub enum CellValue {
    Literal(Value),
    /// Rendered verbatim, no parameter allocated
    Expression(String),
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        CellValue::Literal(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Literal(Value::String(value))
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Literal(Value::from(value))
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Literal(Value::Bool(value))
    }
}

/// Mutable builder state, one per builder
#[derive(Debug, Default)]
pub struct QueryExpression {
    pub query_type: QueryType,
    pub main_table: String,
    /// Alias used in rendered column references, defaults to the table name
    pub main_alias: String,
    pub metadata: Option<Arc<EntityMetadata>>,
    pub wheres: Vec<WhereClause>,
    pub order_bys: Vec<(String, OrderBySpec)>,
    /// Raw LIMIT / OFFSET, validated against the dialect at render time
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Entity-aware pagination aliases, they win over limit/offset when set
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub parameters: HashMap<String, Value>,
    /// Driver-ready values already bound by the caller, merged last
    pub native_parameters: HashMap<String, Value>,
    pub returning: Vec<String>,
    /// Conflict target columns for upserts
    pub on_conflict: Vec<String>,
    /// Columns overwritten on conflict
    pub on_update: Vec<String>,
    pub on_ignore: bool,
    /// Entities whose primary keys drive the WHERE clause
    pub where_entities: Vec<Value>,
    /// Set when update values came from a mapped entity, enables auto columns
    pub update_entity: bool,
}

impl QueryExpression {
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            main_alias: table.clone(),
            main_table: table,
            ..Default::default()
        }
    }

    pub fn for_query(query_type: QueryType, table: impl Into<String>) -> Self {
        let mut expression = Self::new(table);
        expression.query_type = query_type;
        expression
    }

    pub fn with_metadata(table: impl Into<String>, metadata: Arc<EntityMetadata>) -> Self {
        let mut expression = Self::new(table);
        expression.metadata = Some(metadata);
        expression
    }

    /// Append a where clause, forcing the first one to `Simple`
    pub fn push_where(&mut self, connector: WhereConnector, condition: WhereCondition) {
        let connector = if self.wheres.is_empty() {
            WhereConnector::Simple
        } else {
            connector
        };
        self.wheres.push(WhereClause {
            connector,
            condition,
        });
    }

    /// Effective limit: `take` wins over raw `limit` when both are set
    pub fn effective_limit(&self) -> Option<u64> {
        self.take.or(self.limit)
    }

    /// Effective offset: `skip` wins over raw `offset` when both are set
    pub fn effective_offset(&self) -> Option<u64> {
        self.skip.or(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;

    #[test]
    fn test_first_where_is_always_simple() {
        let mut expression = QueryExpression::new("user");
        expression.push_where(
            WhereConnector::And,
            WhereCondition::Operator {
                column: "id".to_string(),
                operator: Operator::equal(1),
            },
        );
        expression.push_where(
            WhereConnector::Or,
            WhereCondition::Raw("name IS NOT NULL".to_string()),
        );

        assert_eq!(expression.wheres[0].connector, WhereConnector::Simple);
        assert_eq!(expression.wheres[1].connector, WhereConnector::Or);
    }

    #[test]
    fn test_take_and_skip_take_precedence() {
        let mut expression = QueryExpression::new("user");
        expression.limit = Some(100);
        expression.take = Some(10);
        expression.offset = Some(50);
        expression.skip = Some(5);

        assert_eq!(expression.effective_limit(), Some(10));
        assert_eq!(expression.effective_offset(), Some(5));
    }

    #[test]
    fn test_alias_defaults_to_table_name() {
        let expression = QueryExpression::new("orders");
        assert_eq!(expression.main_alias, "orders");
    }
}

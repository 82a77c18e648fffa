//! Convenience re-exports for common query-object usage

pub use crate::builder::{
    DeleteQueryBuilder, InsertQueryBuilder, JoinClause, JoinType, QueryBuilderContext,
    QueryExecutionResult, RelationQueryBuilder, SelectQueryBuilder, SoftDeleteKind,
    SoftDeleteQueryBuilder, UpdateQueryBuilder,
};
pub use crate::dialect::Dialect;
pub use crate::errors::QueryObjectError;
pub use crate::expression::{CellValue, NullsOrder, OrderBySpec, SortOrder};
pub use crate::metadata::{
    ColumnMetadata, ColumnRole, DeleteDateValue, EntityMetadata, JoinColumn, JunctionMetadata,
    RelationKind, RelationMetadata,
};
pub use crate::operator::Operator;
pub use crate::runner::{QueryRunner, QueryRunnerFactory, RawQueryResult};

// Common external dependencies
pub use cache_system::prelude::{CacheOptions, QueryResultCache};
pub use serde_json::{json, Value};
pub use signal_system::prelude::{Broadcaster, Subscriber};

//! Query Object - Core query building layer for Queryhaus
//!
//! This crate provides the dialect capability resolver, the operator tree,
//! the expression map and the query builders that render and execute SQL
//! against any supported database engine through the runner contract.

pub mod builder;
pub mod dialect;
pub mod errors;
pub mod expression;
pub mod metadata;
pub mod operator;
pub mod params;
pub mod prelude;
pub mod runner;

pub use builder::{
    DeleteQueryBuilder, InsertQueryBuilder, JoinClause, JoinType, QueryBuilderContext,
    QueryExecutionResult, RelationQueryBuilder, SelectQueryBuilder, SoftDeleteKind,
    SoftDeleteQueryBuilder, UpdateQueryBuilder,
};
pub use dialect::Dialect;
pub use errors::QueryObjectError;
pub use expression::{CellValue, NullsOrder, OrderBySpec, QueryExpression, QueryType, SortOrder};
pub use metadata::{
    ColumnMetadata, ColumnRole, DeleteDateValue, EntityMetadata, JoinColumn, JunctionMetadata,
    RelationKind, RelationMetadata,
};
pub use operator::{NotOperand, Operator};
pub use runner::{QueryRunner, QueryRunnerFactory, RawQueryResult};

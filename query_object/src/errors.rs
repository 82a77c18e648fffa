//! Error types for query building and execution
//!
//! Rendering errors are raised synchronously, before any SQL reaches a
//! driver; execution errors surface from the query runner.

use crate::dialect::Dialect;
use crate::metadata::RelationKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryObjectError {
    /// A clause or feature the active dialect cannot express was requested
    #[error("{feature} is not supported by the {dialect} dialect")]
    Capability { dialect: Dialect, feature: String },

    /// The active database engine has no parameter placeholder syntax
    #[error("the {0} database engine does not support parameters")]
    ParametersNotSupported(Dialect),

    /// A named parameter referenced in a fragment is missing from the bag
    #[error("parameter \"{0}\" was not found in the parameter bag")]
    MissingParameter(String),

    /// Builder usage error: a required piece of configuration is absent
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Soft delete / restore requires a declared delete date column
    #[error("entity mapped to table \"{0}\" does not declare a delete date column, soft delete and restore are not possible")]
    MissingDeleteDateColumn(String),

    /// An UPDATE would render an empty SET clause
    #[error("cannot perform an update: no update values or auto columns were supplied")]
    UpdateValuesMissing,

    /// Wrong relation mutation for the relation's cardinality
    #[error("operation \"{operation}\" is not allowed for {cardinality:?} relations")]
    CardinalityMismatch {
        operation: &'static str,
        cardinality: RelationKind,
    },

    /// A composite key needs an id map, or a scalar id was ambiguous
    #[error("relation \"{relation}\" uses a composite key; pass an id map instead of a scalar value")]
    InvalidIdentifier { relation: String },

    /// Propagated unchanged from the query runner
    #[error("database error: {0}")]
    Database(String),
}

impl QueryObjectError {
    /// Shorthand for a capability violation
    pub fn capability(dialect: Dialect, feature: impl Into<String>) -> Self {
        Self::Capability {
            dialect,
            feature: feature.into(),
        }
    }
}

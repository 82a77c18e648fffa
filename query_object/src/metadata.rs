//! Entity and relation metadata
//!
//! A lightweight mapping description that the builders consult for table
//! names, column roles, primary keys and relation wiring. Metadata is built
//! once by the caller and shared behind an `Arc`.

use std::fmt;
use std::sync::Arc;

/// How a soft-deleted row's delete date is produced
#[derive(Clone)]
pub enum DeleteDateValue {
    /// Fixed value, passed through as a statement parameter
    Literal(String),
    /// Caller-supplied factory producing a raw SQL expression
    Factory(Arc<dyn Fn() -> String + Send + Sync>),
}

impl fmt::Debug for DeleteDateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Factory(_) => write!(f, "Factory(<fn>)"),
        }
    }
}

/// Special handling a column participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Regular,
    /// Set on soft delete, cleared on restore
    DeleteDate,
    /// Bumped to the engine's now expression on every update
    UpdateDate,
    /// Incremented by one on every update
    Version,
}

#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub name: String,
    pub is_primary: bool,
    /// Database-generated columns are excluded from inferred insert lists
    pub is_generated: bool,
    pub role: ColumnRole,
    pub delete_date_value: Option<DeleteDateValue>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_primary: false,
            is_generated: false,
            role: ColumnRole::Regular,
            delete_date_value: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }

    pub fn role(mut self, role: ColumnRole) -> Self {
        self.role = role;
        self
    }

    pub fn delete_date_value(mut self, value: DeleteDateValue) -> Self {
        self.delete_date_value = Some(value);
        self
    }
}

/// Cardinality of a mapped relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    /// One-to-one where the foreign key lives on the other table
    OneToOneInverse,
    ManyToOne,
    OneToMany,
    /// Junction-table relation seen from the owning side
    ManyToManyOwner,
    /// Junction-table relation seen from the inverse side
    ManyToManyInverse,
}

impl RelationKind {
    /// True when the foreign key column lives on the owning entity's table
    pub fn owns_foreign_key(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }

    pub fn uses_junction(self) -> bool {
        matches!(self, Self::ManyToManyOwner | Self::ManyToManyInverse)
    }
}

/// A foreign key column and the column it points at
#[derive(Debug, Clone)]
pub struct JoinColumn {
    pub column: String,
    pub referenced_column: String,
}

impl JoinColumn {
    pub fn new(column: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

/// Junction table wiring for many-to-many relations
#[derive(Debug, Clone)]
pub struct JunctionMetadata {
    pub table_name: String,
    /// Junction columns referencing the owning entity, in key order
    pub owner_columns: Vec<JoinColumn>,
    /// Junction columns referencing the related entity, in key order
    pub inverse_columns: Vec<JoinColumn>,
}

#[derive(Debug, Clone)]
pub struct RelationMetadata {
    pub name: String,
    pub kind: RelationKind,
    /// Foreign key columns on whichever side owns them
    pub join_columns: Vec<JoinColumn>,
    pub inverse_table: String,
    pub inverse_primary_columns: Vec<String>,
    pub junction: Option<JunctionMetadata>,
}

#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
    pub relations: Vec<RelationMetadata>,
}

impl EntityMetadata {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationMetadata) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn delete_date_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.role == ColumnRole::DeleteDate)
    }

    pub fn update_date_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.role == ColumnRole::UpdateDate)
    }

    pub fn version_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.role == ColumnRole::Version)
    }

    pub fn primary_columns(&self) -> Vec<&ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_primary).collect()
    }

    /// Columns an inferred INSERT covers: everything not database-generated
    pub fn insert_columns(&self) -> Vec<&ColumnMetadata> {
        self.columns.iter().filter(|c| !c.is_generated).collect()
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationMetadata> {
        self.relations.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lookups() {
        let metadata = EntityMetadata::new("user")
            .column(ColumnMetadata::new("id").primary().generated())
            .column(ColumnMetadata::new("name"))
            .column(ColumnMetadata::new("deleted_at").role(ColumnRole::DeleteDate))
            .column(ColumnMetadata::new("updated_at").role(ColumnRole::UpdateDate))
            .column(ColumnMetadata::new("version").role(ColumnRole::Version));

        assert_eq!(metadata.delete_date_column().unwrap().name, "deleted_at");
        assert_eq!(metadata.update_date_column().unwrap().name, "updated_at");
        assert_eq!(metadata.version_column().unwrap().name, "version");
        assert_eq!(metadata.primary_columns().len(), 1);
    }

    #[test]
    fn test_insert_columns_skip_generated() {
        let metadata = EntityMetadata::new("user")
            .column(ColumnMetadata::new("id").primary().generated())
            .column(ColumnMetadata::new("name"))
            .column(ColumnMetadata::new("email"));

        let names: Vec<&str> = metadata
            .insert_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "email"]);
    }

    #[test]
    fn test_relation_kind_predicates() {
        assert!(RelationKind::ManyToOne.owns_foreign_key());
        assert!(!RelationKind::OneToMany.owns_foreign_key());
        assert!(RelationKind::ManyToManyOwner.uses_junction());
        assert!(!RelationKind::OneToOne.uses_junction());
    }
}

//! Relation mutation planner
//!
//! Plans and executes the statements that rewire a mapped relation: foreign
//! key updates for single-valued sides and junction-table inserts/deletes
//! for many-to-many sides. Planning is pure; execution reuses the shared
//! runner/transaction protocol.

use super::{QueryBuilderContext, QueryExecutionResult};
use crate::errors::QueryObjectError;
use crate::metadata::{EntityMetadata, JunctionMetadata, RelationKind, RelationMetadata};
use crate::params::{bind_named_parameters, ParameterAllocator};
use serde_json::Value;
use signal_system::prelude::{EntityEvent, EventAction};
use std::collections::HashMap;
use std::sync::Arc;

/// One planned statement, driver-ready
#[derive(Debug, Clone)]
pub(crate) struct PlannedStatement {
    pub sql: String,
    pub parameters: Vec<Value>,
}

/// The full plan for one relation mutation
#[derive(Debug, Default)]
pub(crate) struct RelationMutationPlan {
    pub statements: Vec<PlannedStatement>,
    /// Junction row inserts that may be dispatched concurrently on engines
    /// that reject multi-row VALUES lists
    pub concurrent: Vec<PlannedStatement>,
}

impl RelationMutationPlan {
    fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.concurrent.is_empty()
    }
}

/// Fluent relation mutation builder
///
/// `of` names the entity whose relation is being changed; `set`, `add` and
/// `remove` describe the change. Which operations are legal depends on the
/// relation's cardinality.
#[derive(Debug)]
pub struct RelationQueryBuilder {
    context: QueryBuilderContext,
    metadata: Arc<EntityMetadata>,
    relation_name: String,
    of: Option<Value>,
}

impl RelationQueryBuilder {
    pub fn new(
        context: QueryBuilderContext,
        metadata: Arc<EntityMetadata>,
        relation_name: impl Into<String>,
    ) -> Self {
        Self {
            context,
            metadata,
            relation_name: relation_name.into(),
            of: None,
        }
    }

    /// The entity (or its id) whose relation is mutated. An array names
    /// several targets at once where the cardinality allows it.
    pub fn of(mut self, entity: Value) -> Self {
        self.of = Some(entity);
        self
    }

    fn relation(&self) -> Result<&RelationMetadata, QueryObjectError> {
        self.metadata
            .find_relation(&self.relation_name)
            .ok_or_else(|| {
                QueryObjectError::MissingConfiguration(format!(
                    "relation \"{}\" on table \"{}\"",
                    self.relation_name, self.metadata.table_name
                ))
            })
    }

    fn require_of(&self) -> Result<&Value, QueryObjectError> {
        self.of.as_ref().ok_or_else(|| {
            QueryObjectError::MissingConfiguration(
                "of(...) must be called before mutating a relation".to_string(),
            )
        })
    }

    /// Point a single-valued relation at a new target, or NULL to detach
    pub async fn set(&self, value: Option<Value>) -> Result<QueryExecutionResult, QueryObjectError> {
        let relation = self.relation()?;
        let plan = match relation.kind {
            RelationKind::OneToOne | RelationKind::ManyToOne => {
                self.plan_owner_set(relation, value)?
            }
            RelationKind::OneToOneInverse | RelationKind::OneToMany => {
                self.plan_inverse_set(relation, value)?
            }
            kind => {
                return Err(QueryObjectError::CardinalityMismatch {
                    operation: "set",
                    cardinality: kind,
                })
            }
        };
        self.execute_plan(plan).await
    }

    /// Attach targets to a collection relation
    pub async fn add(&self, values: Vec<Value>) -> Result<QueryExecutionResult, QueryObjectError> {
        let relation = self.relation()?;
        let plan = match relation.kind {
            RelationKind::OneToMany | RelationKind::OneToOneInverse => {
                self.plan_one_to_many_add(relation, &values)?
            }
            RelationKind::ManyToManyOwner | RelationKind::ManyToManyInverse => {
                self.plan_junction_insert(relation, &values)?
            }
            kind => {
                return Err(QueryObjectError::CardinalityMismatch {
                    operation: "add",
                    cardinality: kind,
                })
            }
        };
        self.execute_plan(plan).await
    }

    /// Detach targets from a collection relation
    pub async fn remove(
        &self,
        values: Vec<Value>,
    ) -> Result<QueryExecutionResult, QueryObjectError> {
        let relation = self.relation()?;
        let plan = self.plan_remove(relation, &values)?;
        self.execute_plan(plan).await
    }

    /// Detach then attach in one transaction, removals first
    pub async fn add_and_remove(
        &self,
        add: Vec<Value>,
        remove: Vec<Value>,
    ) -> Result<QueryExecutionResult, QueryObjectError> {
        let relation = self.relation()?;
        let mut plan = self.plan_remove(relation, &remove)?;
        let additions = match relation.kind {
            RelationKind::OneToMany | RelationKind::OneToOneInverse => {
                self.plan_one_to_many_add(relation, &add)?
            }
            RelationKind::ManyToManyOwner | RelationKind::ManyToManyInverse => {
                self.plan_junction_insert(relation, &add)?
            }
            kind => {
                return Err(QueryObjectError::CardinalityMismatch {
                    operation: "add_and_remove",
                    cardinality: kind,
                })
            }
        };
        plan.statements.extend(additions.statements);
        plan.concurrent.extend(additions.concurrent);
        self.execute_plan(plan).await
    }

    fn plan_remove(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        match relation.kind {
            RelationKind::OneToMany => self.plan_one_to_many_remove(relation, values),
            // detaching a one-to-one inverse side clears the foreign key on
            // whichever row points at `of`
            RelationKind::OneToOneInverse => {
                if values.is_empty() {
                    Ok(RelationMutationPlan::default())
                } else {
                    self.plan_inverse_set(relation, None)
                }
            }
            RelationKind::ManyToManyOwner | RelationKind::ManyToManyInverse => {
                self.plan_junction_delete(relation, values)
            }
            kind => Err(QueryObjectError::CardinalityMismatch {
                operation: "remove",
                cardinality: kind,
            }),
        }
    }

    /// Key values of an identifier against a column list
    ///
    /// A scalar identifier only fits a single-column key; composite keys
    /// need an object carrying every column. An array is never a key, it
    /// enumerates targets and is expanded by the caller.
    fn key_values(
        &self,
        identifier: &Value,
        columns: &[String],
    ) -> Result<Vec<Value>, QueryObjectError> {
        if let Value::Object(object) = identifier {
            return columns
                .iter()
                .map(|column| {
                    object.get(column).cloned().ok_or_else(|| {
                        QueryObjectError::InvalidIdentifier {
                            relation: self.relation_name.clone(),
                        }
                    })
                })
                .collect();
        }
        if columns.len() != 1 || identifier.is_array() {
            return Err(QueryObjectError::InvalidIdentifier {
                relation: self.relation_name.clone(),
            });
        }
        Ok(vec![identifier.clone()])
    }

    /// The `of` targets, an array expanding into one target per element
    fn of_targets(&self) -> Result<Vec<Value>, QueryObjectError> {
        match self.require_of()? {
            Value::Array(items) => Ok(items.clone()),
            other => Ok(vec![other.clone()]),
        }
    }

    /// Predicate matching `columns` against one or many target identifiers:
    /// plain equality for a single target, an IN list or OR'd key groups
    /// otherwise
    fn key_predicate(
        &self,
        columns: &[String],
        key_columns: &[String],
        targets: &[Value],
        params: &mut ParameterAllocator,
    ) -> Result<String, QueryObjectError> {
        if targets.len() == 1 {
            let keys = self.key_values(&targets[0], key_columns)?;
            let parts: Vec<String> = columns
                .iter()
                .zip(keys)
                .map(|(column, key)| format!("{} = {}", column, params.push(key)))
                .collect();
            return Ok(parts.join(" AND "));
        }
        if columns.len() == 1 {
            let tokens: Vec<String> = targets
                .iter()
                .map(|target| {
                    let keys = self.key_values(target, key_columns)?;
                    Ok(params.push(keys.into_iter().next().unwrap_or(Value::Null)))
                })
                .collect::<Result<_, QueryObjectError>>()?;
            return Ok(format!("{} IN ({})", columns[0], tokens.join(", ")));
        }
        let groups: Vec<String> = targets
            .iter()
            .map(|target| {
                let keys = self.key_values(target, key_columns)?;
                let parts: Vec<String> = columns
                    .iter()
                    .zip(keys)
                    .map(|(column, key)| format!("{} = {}", column, params.push(key)))
                    .collect();
                Ok(format!("({})", parts.join(" AND ")))
            })
            .collect::<Result<_, QueryObjectError>>()?;
        Ok(format!("({})", groups.join(" OR ")))
    }

    fn finalize(
        &self,
        sql: String,
        params: ParameterAllocator,
    ) -> Result<PlannedStatement, QueryObjectError> {
        let mut bag = HashMap::new();
        params.merge_into(&mut bag);
        let (sql, parameters) = bind_named_parameters(&sql, &bag, self.context.dialect)?;
        Ok(PlannedStatement { sql, parameters })
    }

    /// UPDATE the owning table's foreign key columns
    fn plan_owner_set(
        &self,
        relation: &RelationMetadata,
        value: Option<Value>,
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        let mut params = ParameterAllocator::new();

        let sets: Vec<String> = match &value {
            Some(target) => {
                let referenced: Vec<String> = relation
                    .join_columns
                    .iter()
                    .map(|jc| jc.referenced_column.clone())
                    .collect();
                let target_keys = self.key_values(target, &referenced)?;
                relation
                    .join_columns
                    .iter()
                    .zip(target_keys)
                    .map(|(jc, key)| format!("{} = {}", jc.column, params.push(key)))
                    .collect()
            }
            None => relation
                .join_columns
                .iter()
                .map(|jc| format!("{} = NULL", jc.column))
                .collect(),
        };

        let own_primary: Vec<String> = self
            .metadata
            .primary_columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let targets = self.of_targets()?;
        let guard = self.key_predicate(&own_primary, &own_primary, &targets, &mut params)?;

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.metadata.table_name,
            sets.join(", "),
            guard
        );
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// UPDATE the inverse table's foreign key for relations stored on the
    /// other side. Pointing at a target requires a single `of`; detaching
    /// clears the key on whichever rows point at any `of` target.
    fn plan_inverse_set(
        &self,
        relation: &RelationMetadata,
        value: Option<Value>,
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        let mut params = ParameterAllocator::new();

        let referenced: Vec<String> = relation
            .join_columns
            .iter()
            .map(|jc| jc.referenced_column.clone())
            .collect();

        let sql = match value {
            Some(target) => {
                let of_keys = self.key_values(self.require_of()?, &referenced)?;
                let target_keys =
                    self.key_values(&target, &relation.inverse_primary_columns)?;
                let sets: Vec<String> = relation
                    .join_columns
                    .iter()
                    .zip(of_keys)
                    .map(|(jc, key)| format!("{} = {}", jc.column, params.push(key)))
                    .collect();
                let wheres: Vec<String> = relation
                    .inverse_primary_columns
                    .iter()
                    .zip(target_keys)
                    .map(|(column, key)| format!("{} = {}", column, params.push(key)))
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    relation.inverse_table,
                    sets.join(", "),
                    wheres.join(" AND ")
                )
            }
            None => {
                let columns: Vec<String> = relation
                    .join_columns
                    .iter()
                    .map(|jc| jc.column.clone())
                    .collect();
                let sets: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{} = NULL", column))
                    .collect();
                let targets = self.of_targets()?;
                let guard =
                    self.key_predicate(&columns, &referenced, &targets, &mut params)?;
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    relation.inverse_table,
                    sets.join(", "),
                    guard
                )
            }
        };
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// UPDATE child rows to point at the `of` entity
    fn plan_one_to_many_add(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        if values.is_empty() {
            return Ok(RelationMutationPlan::default());
        }
        let of = self.require_of()?;
        let mut params = ParameterAllocator::new();

        let referenced: Vec<String> = relation
            .join_columns
            .iter()
            .map(|jc| jc.referenced_column.clone())
            .collect();
        let of_keys = self.key_values(of, &referenced)?;
        let sets: Vec<String> = relation
            .join_columns
            .iter()
            .zip(of_keys)
            .map(|(jc, key)| format!("{} = {}", jc.column, params.push(key)))
            .collect();

        let predicate = self.child_key_predicate(relation, values, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            relation.inverse_table,
            sets.join(", "),
            predicate
        );
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// Clear the foreign key on child rows currently pointing at `of`
    fn plan_one_to_many_remove(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        if values.is_empty() {
            return Ok(RelationMutationPlan::default());
        }
        let mut params = ParameterAllocator::new();

        let sets: Vec<String> = relation
            .join_columns
            .iter()
            .map(|jc| format!("{} = NULL", jc.column))
            .collect();

        let predicate = self.child_key_predicate(relation, values, &mut params)?;

        let columns: Vec<String> = relation
            .join_columns
            .iter()
            .map(|jc| jc.column.clone())
            .collect();
        let referenced: Vec<String> = relation
            .join_columns
            .iter()
            .map(|jc| jc.referenced_column.clone())
            .collect();
        let targets = self.of_targets()?;
        let guard = self.key_predicate(&columns, &referenced, &targets, &mut params)?;

        let sql = format!(
            "UPDATE {} SET {} WHERE ({}) AND {}",
            relation.inverse_table,
            sets.join(", "),
            predicate,
            guard
        );
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// Predicate matching child rows by their primary keys
    fn child_key_predicate(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
        params: &mut ParameterAllocator,
    ) -> Result<String, QueryObjectError> {
        let columns = &relation.inverse_primary_columns;
        if columns.len() == 1 {
            let tokens: Vec<String> = values
                .iter()
                .map(|value| {
                    let keys = self.key_values(value, columns)?;
                    Ok(params.push(keys.into_iter().next().unwrap_or(Value::Null)))
                })
                .collect::<Result<_, QueryObjectError>>()?;
            return Ok(format!("{} IN ({})", columns[0], tokens.join(", ")));
        }
        let groups: Vec<String> = values
            .iter()
            .map(|value| {
                let keys = self.key_values(value, columns)?;
                let parts: Vec<String> = columns
                    .iter()
                    .zip(keys)
                    .map(|(column, key)| format!("{} = {}", column, params.push(key)))
                    .collect();
                Ok(format!("({})", parts.join(" AND ")))
            })
            .collect::<Result<_, QueryObjectError>>()?;
        Ok(groups.join(" OR "))
    }

    fn junction<'a>(
        &self,
        relation: &'a RelationMetadata,
    ) -> Result<&'a JunctionMetadata, QueryObjectError> {
        relation.junction.as_ref().ok_or_else(|| {
            QueryObjectError::MissingConfiguration(format!(
                "junction metadata for relation \"{}\"",
                self.relation_name
            ))
        })
    }

    /// Junction columns split into (this side, other side) for the relation
    /// direction being mutated
    fn junction_sides<'a>(
        &self,
        relation: &'a RelationMetadata,
        junction: &'a JunctionMetadata,
    ) -> (
        &'a [crate::metadata::JoinColumn],
        &'a [crate::metadata::JoinColumn],
    ) {
        match relation.kind {
            RelationKind::ManyToManyInverse => {
                (&junction.inverse_columns, &junction.owner_columns)
            }
            _ => (&junction.owner_columns, &junction.inverse_columns),
        }
    }

    /// Cross-product INSERTs into the junction table
    fn plan_junction_insert(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        if values.is_empty() {
            return Ok(RelationMutationPlan::default());
        }
        let targets = self.of_targets()?;
        let junction = self.junction(relation)?;
        let (own_side, other_side) = self.junction_sides(relation, junction);

        let own_referenced: Vec<String> =
            own_side.iter().map(|jc| jc.referenced_column.clone()).collect();
        let other_referenced: Vec<String> =
            other_side.iter().map(|jc| jc.referenced_column.clone()).collect();

        let columns: Vec<String> = own_side
            .iter()
            .chain(other_side.iter())
            .map(|jc| jc.column.clone())
            .collect();

        // every `of` target pairs with every value
        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(targets.len() * values.len());
        for target in &targets {
            let of_keys = self.key_values(target, &own_referenced)?;
            for value in values {
                let value_keys = self.key_values(value, &other_referenced)?;
                let mut row = of_keys.clone();
                row.extend(value_keys);
                rows.push(row);
            }
        }

        if self.context.dialect.requires_serial_junction_insert() {
            // one single-row INSERT per pair, dispatched together
            let mut concurrent = Vec::with_capacity(rows.len());
            for row in rows {
                let mut params = ParameterAllocator::new();
                let tokens: Vec<String> =
                    row.into_iter().map(|value| params.push(value)).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    junction.table_name,
                    columns.join(", "),
                    tokens.join(", ")
                );
                concurrent.push(self.finalize(sql, params)?);
            }
            return Ok(RelationMutationPlan {
                statements: Vec::new(),
                concurrent,
            });
        }

        let mut params = ParameterAllocator::new();
        let fragments: Vec<String> = rows
            .into_iter()
            .map(|row| {
                let tokens: Vec<String> =
                    row.into_iter().map(|value| params.push(value)).collect();
                format!("({})", tokens.join(", "))
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            junction.table_name,
            columns.join(", "),
            fragments.join(", ")
        );
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// DELETE junction rows pairing `of` with the given targets
    fn plan_junction_delete(
        &self,
        relation: &RelationMetadata,
        values: &[Value],
    ) -> Result<RelationMutationPlan, QueryObjectError> {
        if values.is_empty() {
            return Ok(RelationMutationPlan::default());
        }
        let targets = self.of_targets()?;
        let junction = self.junction(relation)?;
        let (own_side, other_side) = self.junction_sides(relation, junction);

        let own_referenced: Vec<String> =
            own_side.iter().map(|jc| jc.referenced_column.clone()).collect();
        let other_referenced: Vec<String> =
            other_side.iter().map(|jc| jc.referenced_column.clone()).collect();
        let own_columns: Vec<String> =
            own_side.iter().map(|jc| jc.column.clone()).collect();

        let mut params = ParameterAllocator::new();
        let guard = self.key_predicate(&own_columns, &own_referenced, &targets, &mut params)?;

        let target_predicate = if other_side.len() == 1 {
            let tokens: Vec<String> = values
                .iter()
                .map(|value| {
                    let keys = self.key_values(value, &other_referenced)?;
                    Ok(params.push(keys.into_iter().next().unwrap_or(Value::Null)))
                })
                .collect::<Result<_, QueryObjectError>>()?;
            format!("{} IN ({})", other_side[0].column, tokens.join(", "))
        } else {
            let groups: Vec<String> = values
                .iter()
                .map(|value| {
                    let keys = self.key_values(value, &other_referenced)?;
                    let parts: Vec<String> = other_side
                        .iter()
                        .zip(keys)
                        .map(|(jc, key)| format!("{} = {}", jc.column, params.push(key)))
                        .collect();
                    Ok(format!("({})", parts.join(" AND ")))
                })
                .collect::<Result<_, QueryObjectError>>()?;
            groups.join(" OR ")
        };

        let sql = format!(
            "DELETE FROM {} WHERE {} AND ({})",
            junction.table_name,
            guard,
            target_predicate
        );
        Ok(RelationMutationPlan {
            statements: vec![self.finalize(sql, params)?],
            concurrent: Vec::new(),
        })
    }

    /// Run a plan under the shared runner/transaction protocol
    ///
    /// An empty plan is a no-op: no runner is acquired and no transaction
    /// is opened.
    async fn execute_plan(
        &self,
        plan: RelationMutationPlan,
    ) -> Result<QueryExecutionResult, QueryObjectError> {
        if plan.is_empty() {
            return Ok(QueryExecutionResult::default());
        }

        let acquired = super::acquire_runner(&self.context).await?;
        let runner = acquired.runner.clone();

        let owns_transaction = self.context.use_transaction && !runner.is_transaction_active();
        if owns_transaction {
            if let Err(error) = runner.start_transaction().await {
                if acquired.owned {
                    let _ = runner.release().await;
                }
                return Err(error);
            }
        }

        let event_entities: Vec<Value> = self.of.iter().cloned().collect();
        if let Some(broadcaster) = &self.context.broadcaster {
            let event = EntityEvent::new(EventAction::Update, self.metadata.table_name.clone())
                .with_entities(event_entities.clone());
            broadcaster.broadcast_before(&event).await;
        }

        let mut affected = 0u64;
        let mut outcome: Result<(), QueryObjectError> = Ok(());

        for statement in &plan.statements {
            tracing::debug!(sql = %statement.sql, "executing relation statement");
            match runner.query(&statement.sql, &statement.parameters).await {
                Ok(result) => affected += result.rows_affected,
                Err(error) => {
                    outcome = Err(error);
                    break;
                }
            }
        }

        if outcome.is_ok() && !plan.concurrent.is_empty() {
            let pending = plan.concurrent.iter().map(|statement| {
                let runner = runner.clone();
                async move { runner.query(&statement.sql, &statement.parameters).await }
            });
            match futures::future::try_join_all(pending).await {
                Ok(results) => {
                    affected += results.iter().map(|r| r.rows_affected).sum::<u64>()
                }
                Err(error) => outcome = Err(error),
            }
        }

        let outcome = match outcome {
            Ok(()) => {
                if let Some(broadcaster) = &self.context.broadcaster {
                    let event =
                        EntityEvent::new(EventAction::Update, self.metadata.table_name.clone())
                            .with_entities(event_entities);
                    broadcaster.broadcast_after(&event).await;
                }
                if owns_transaction {
                    match runner.commit_transaction().await {
                        Ok(()) => Ok(()),
                        Err(error) => {
                            super::rollback_owned(&runner).await;
                            Err(error)
                        }
                    }
                } else {
                    Ok(())
                }
            }
            Err(error) => {
                if owns_transaction {
                    super::rollback_owned(&runner).await;
                }
                Err(error)
            }
        };

        if acquired.owned {
            let release = runner.release().await;
            if outcome.is_ok() {
                release?;
            }
        }

        outcome.map(|()| QueryExecutionResult {
            raw: Vec::new(),
            affected,
            entities: Vec::new(),
        })
    }
}

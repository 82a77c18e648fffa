//! Persistence event types and definitions
//!
//! This module defines the structure of persistence lifecycle events
//! that flow through the signal system.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The mutating action an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAction {
    Insert,
    Update,
    Remove,
    SoftRemove,
    Recover,
}

/// A persistence lifecycle event
///
/// One event is broadcast before and one after every mutating statement
/// that targets a mapped entity. The `entities` payload carries the entity
/// objects involved in the statement, when known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEvent {
    /// The action being performed
    pub action: EventAction,
    /// Target table name
    pub table_name: String,
    /// Entity objects involved in the statement (may be empty for raw targets)
    pub entities: Vec<Value>,
    /// Event timestamp (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EntityEvent {
    pub fn new(action: EventAction, table_name: String) -> Self {
        Self {
            action,
            table_name,
            entities: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<Value>) -> Self {
        self.entities = entities;
        self
    }

    pub fn add_entity(&mut self, entity: Value) {
        self.entities.push(entity);
    }
}

//! Subscriber trait definitions
//!
//! Subscribers receive persistence lifecycle events. Every hook has a
//! default empty implementation so a subscriber only overrides the hooks
//! it cares about.

use crate::event::EntityEvent;
use async_trait::async_trait;

/// An entity lifecycle subscriber
///
/// Hooks are async; the broadcaster awaits every pending hook before the
/// surrounding statement proceeds (before-hooks) or completes (after-hooks).
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Restrict this subscriber to a single table; `None` listens to all
    fn listen_to(&self) -> Option<&str> {
        None
    }

    async fn before_insert(&self, _event: &EntityEvent) {}
    async fn after_insert(&self, _event: &EntityEvent) {}

    async fn before_update(&self, _event: &EntityEvent) {}
    async fn after_update(&self, _event: &EntityEvent) {}

    async fn before_remove(&self, _event: &EntityEvent) {}
    async fn after_remove(&self, _event: &EntityEvent) {}

    async fn before_soft_remove(&self, _event: &EntityEvent) {}
    async fn after_soft_remove(&self, _event: &EntityEvent) {}

    async fn before_recover(&self, _event: &EntityEvent) {}
    async fn after_recover(&self, _event: &EntityEvent) {}
}

//! Event broadcasting
//!
//! The broadcaster fans persistence lifecycle events out to registered
//! subscribers and awaits their pending hook futures.

use crate::event::{EntityEvent, EventAction};
use crate::subscriber::Subscriber;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Broadcaster for persistence lifecycle events
pub struct Broadcaster {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscriber_count", &self.try_subscriber_count())
            .finish()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Remove all subscribers
    pub async fn clear_subscribers(&self) {
        self.subscribers.write().await.clear();
    }

    /// Get number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    fn try_subscriber_count(&self) -> usize {
        self.subscribers.try_read().map(|s| s.len()).unwrap_or(0)
    }

    /// Broadcast a before-event and await every pending subscriber hook
    pub async fn broadcast_before(&self, event: &EntityEvent) {
        let targets = self.targets_for(event).await;
        tracing::debug!(
            table = %event.table_name,
            action = ?event.action,
            subscribers = targets.len(),
            "broadcasting before-event"
        );
        let pending = targets.iter().map(|subscriber| async move {
            match event.action {
                EventAction::Insert => subscriber.before_insert(event).await,
                EventAction::Update => subscriber.before_update(event).await,
                EventAction::Remove => subscriber.before_remove(event).await,
                EventAction::SoftRemove => subscriber.before_soft_remove(event).await,
                EventAction::Recover => subscriber.before_recover(event).await,
            }
        });
        futures::future::join_all(pending).await;
    }

    /// Broadcast an after-event and await every pending subscriber hook
    pub async fn broadcast_after(&self, event: &EntityEvent) {
        let targets = self.targets_for(event).await;
        tracing::debug!(
            table = %event.table_name,
            action = ?event.action,
            subscribers = targets.len(),
            "broadcasting after-event"
        );
        let pending = targets.iter().map(|subscriber| async move {
            match event.action {
                EventAction::Insert => subscriber.after_insert(event).await,
                EventAction::Update => subscriber.after_update(event).await,
                EventAction::Remove => subscriber.after_remove(event).await,
                EventAction::SoftRemove => subscriber.after_soft_remove(event).await,
                EventAction::Recover => subscriber.after_recover(event).await,
            }
        });
        futures::future::join_all(pending).await;
    }

    /// Subscribers listening to this event's table
    async fn targets_for(&self, event: &EntityEvent) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|subscriber| match subscriber.listen_to() {
                Some(table) => table == event.table_name,
                None => true,
            })
            .cloned()
            .collect()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

//! Signal system for persistence lifecycle events
//!
//! This crate provides async broadcasting of entity lifecycle events
//! (insert/update/remove/soft-remove/recover) for query execution in the
//! QueryHaus ecosystem.

pub mod broadcaster;
pub mod event;
pub mod prelude;
pub mod subscriber;

pub use broadcaster::Broadcaster;
pub use event::{EntityEvent, EventAction};
pub use subscriber::Subscriber;

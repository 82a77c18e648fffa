//! Convenience re-exports for common signal-system usage

// Core signal system components
pub use crate::broadcaster::Broadcaster;
pub use crate::event::{EntityEvent, EventAction};
pub use crate::subscriber::Subscriber;

// Common external dependencies
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

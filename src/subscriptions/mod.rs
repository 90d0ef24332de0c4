//! Subscriptions to live key updates.
//!
//! A subscriber registers at an exact key (`/a/b`) or at a key-space (`/a/`)
//! and receives one [`UpdateEvent`](crate::types::UpdateEvent) per successful
//! mutation of a matching key:
//! - Matching walks from the mutated key up through each enclosing key-space
//! - A subscriber matched at several levels still gets the event once
//! - Delivery queues are bounded; a full queue loses events, never blocks writers
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(EngineConfig::default());
//! let handle = engine.subscribe(&SubscriptionPath::parse("/chat/")?)?;
//!
//! engine.set(&Key::parse("/chat/room1")?, "\"hello\"")?;
//!
//! let event = handle.recv()?;
//! assert_eq!(event.key.as_str(), "/chat/room1");
//! engine.unsubscribe(handle.id())?;
//! ```

mod registry;
mod types;

pub(crate) use registry::SubscriptionRegistry;
pub use types::{SubscriberHandle, SubscriptionId, DEFAULT_SUBSCRIBER_BUFFER};

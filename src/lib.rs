//! # AtomKV
//!
//! An in-memory, hierarchical key-value engine with compare-and-swap updates
//! and live change notification.
//!
//! ## Core Concepts
//!
//! - **Keys**: Slash-separated paths like `/chat/room1`
//! - **Revisions**: Per-key counters starting at 0, bumped by every write
//! - **CAS**: `update` succeeds only with the next revision
//! - **Subscriptions**: Exact keys or whole key-spaces (`/chat/`)
//! - **Expiry**: Keys untouched for the configured time are deleted
//!
//! A single worker thread owns all state; callers reach it through a queue,
//! so every operation lands in one total order.
//!
//! ## Example
//!
//! ```ignore
//! use atomkv::{Engine, EngineConfig, Key, Revision, SubscriptionPath};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let updates = engine.subscribe(&SubscriptionPath::parse("/counters/")?)?;
//!
//! let key = Key::parse("/counters/visits")?;
//! // Optimistic increment loop.
//! loop {
//!     let (count, next) = match engine.get(&key)? {
//!         Some(entry) => (entry.value.parse::<u64>()?, entry.revision.next()),
//!         None => (0, Revision(0)),
//!     };
//!     if engine.update(&key, (count + 1).to_string(), next)? {
//!         break;
//!     }
//! }
//!
//! let event = updates.recv()?;
//! ```

pub mod error;
mod expiry;
#[cfg(feature = "server")]
pub mod http;
pub mod keys;
pub mod payload;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{KvError, Result};
pub use expiry::DEFAULT_EXPIRY;
pub use keys::{Key, SubscriptionPath};
pub use payload::{canonicalize, parse_revision_hint};
pub use store::{Engine, EngineConfig, DEFAULT_REQUEST_QUEUE};
pub use subscriptions::{SubscriberHandle, SubscriptionId, DEFAULT_SUBSCRIBER_BUFFER};
pub use types::*;

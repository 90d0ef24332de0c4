//! Core types for the key-value engine.

use crate::keys::Key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-key version counter. The first successful write of a key is revision 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rev({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored value together with its revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Canonical serialized value.
    pub value: String,
    pub revision: Revision,
}

/// Snapshot of an entry at the moment of a successful mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub key: Key,
    pub value: String,
    pub revision: Revision,
}

impl UpdateEvent {
    pub(crate) fn new(key: &Key, entry: &Entry) -> Self {
        Self {
            key: key.clone(),
            value: entry.value.clone(),
            revision: entry.revision,
        }
    }
}

/// Point-in-time counters reported by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Live keys in the store.
    pub keys: usize,
    /// Distinct subscription paths with at least one subscriber.
    pub subscription_paths: usize,
    /// Registered subscriber handles.
    pub subscribers: usize,
    /// Keys with a pending expiry deadline.
    pub scheduled_expiries: usize,
    /// Events discarded because a subscriber queue was full.
    pub dropped_events: u64,
}

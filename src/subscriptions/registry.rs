//! Subscription registry and hierarchical notifier.
//!
//! Owned by the engine worker, so none of this is synchronized.

use crate::keys::{Key, SubscriptionPath};
use crate::types::{Entry, UpdateEvent};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use super::types::SubscriptionId;

/// Bidirectional index between subscription paths and subscribers.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    /// Registry path (`/a/b` or `/a/`) to the subscribers registered there.
    paths: HashMap<String, HashMap<SubscriptionId, Sender<UpdateEvent>>>,
    /// Reverse index for O(1) removal.
    subscribers: HashMap<SubscriptionId, Vec<String>>,
    dropped_events: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: SubscriptionId,
        path: &SubscriptionPath,
        sender: Sender<UpdateEvent>,
    ) {
        self.paths
            .entry(path.as_str().to_string())
            .or_default()
            .insert(id, sender);
        self.subscribers
            .entry(id)
            .or_default()
            .push(path.as_str().to_string());
    }

    /// Remove a subscriber from every path it is registered at.
    ///
    /// Returns false if the id was unknown.
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        let Some(paths) = self.subscribers.remove(&id) else {
            return false;
        };
        for path in paths {
            if let Some(subs) = self.paths.get_mut(&path) {
                subs.remove(&id);
                if subs.is_empty() {
                    self.paths.remove(&path);
                }
            }
        }
        true
    }

    /// Deliver a mutation of `key` to every matching subscriber, once each.
    ///
    /// Walks from the exact key up through each enclosing key-space. Delivery
    /// never blocks: a full queue loses this event, a disconnected queue is
    /// unregistered. Returns the number of queues the event landed in.
    pub fn notify(&mut self, key: &Key, entry: &Entry) -> usize {
        let mut seen = HashSet::new();
        let mut disconnected = Vec::new();
        let mut delivered = 0;

        for space in key.key_spaces() {
            let Some(subs) = self.paths.get(space) else {
                continue;
            };
            for (id, sender) in subs {
                if !seen.insert(*id) {
                    continue;
                }
                match sender.try_send(UpdateEvent::new(key, entry)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped_events += 1;
                        trace!(
                            subscriber = %id,
                            key = %key,
                            revision = %entry.revision,
                            "Subscriber queue full, event dropped"
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
        }

        for id in disconnected {
            debug!(subscriber = %id, "Subscriber handle dropped, unregistering");
            self.unregister(id);
        }

        delivered
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }
}

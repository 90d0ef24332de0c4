//! Subscription types for live key updates.

use crate::keys::SubscriptionPath;
use crate::types::UpdateEvent;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::time::Duration;

/// Default capacity of a subscriber's delivery queue.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Unique identifier for a subscriber.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-owned end of a subscription.
///
/// The engine holds only the sending side of the queue. Events that arrive
/// while the queue is full are dropped for this subscriber alone, so a gap in
/// revisions is the only sign of a slow consumer.
pub struct SubscriberHandle {
    pub(crate) id: SubscriptionId,
    pub(crate) path: SubscriptionPath,
    pub(crate) receiver: Receiver<UpdateEvent>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn path(&self) -> &SubscriptionPath {
        &self.path
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<UpdateEvent, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<UpdateEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<UpdateEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Events currently buffered.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}

//! The engine: a single worker thread that owns every key and subscription.
//!
//! Callers talk to the worker through a bounded request queue. Requests are
//! handled strictly in arrival order, which gives one total order over all
//! mutations without any lock on the store itself.

use crate::error::{KvError, Result};
use crate::expiry::{ExpirySchedule, DEFAULT_EXPIRY};
use crate::keys::{Key, SubscriptionPath};
use crate::subscriptions::{
    SubscriberHandle, SubscriptionId, SubscriptionRegistry, DEFAULT_SUBSCRIBER_BUFFER,
};
use crate::types::{EngineStats, Entry, Revision, UpdateEvent};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Default capacity of the engine's request queue.
pub const DEFAULT_REQUEST_QUEUE: usize = 1024;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Capacity of each subscriber's delivery queue.
    pub subscriber_buffer: usize,

    /// Idle time after which a key is deleted.
    pub expiry: Duration,

    /// Capacity of the request queue in front of the worker.
    pub request_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            expiry: DEFAULT_EXPIRY,
            request_queue: DEFAULT_REQUEST_QUEUE,
        }
    }
}

impl EngineConfig {
    /// Replace zero values with their defaults.
    fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            subscriber_buffer: if self.subscriber_buffer == 0 {
                defaults.subscriber_buffer
            } else {
                self.subscriber_buffer
            },
            expiry: if self.expiry.is_zero() {
                defaults.expiry
            } else {
                self.expiry
            },
            request_queue: if self.request_queue == 0 {
                defaults.request_queue
            } else {
                self.request_queue
            },
        }
    }
}

enum Request {
    Get {
        key: Key,
        resp: Sender<Option<Entry>>,
    },
    Set {
        key: Key,
        value: String,
    },
    Update {
        key: Key,
        value: String,
        expected: Revision,
        resp: Sender<bool>,
    },
    Delete {
        key: Key,
    },
    Subscribe {
        id: SubscriptionId,
        path: SubscriptionPath,
        sender: Sender<UpdateEvent>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Stats {
        resp: Sender<EngineStats>,
    },
    Shutdown,
}

/// State owned by the worker thread.
struct Worker {
    values: HashMap<Key, Entry>,
    registry: SubscriptionRegistry,
    expiry: ExpirySchedule,
}

impl Worker {
    fn new(config: &EngineConfig) -> Self {
        Self {
            values: HashMap::new(),
            registry: SubscriptionRegistry::new(),
            expiry: ExpirySchedule::new(config.expiry),
        }
    }

    fn run(mut self, requests: Receiver<Request>) {
        info!("Engine worker started");

        loop {
            // Due keys are evicted even when the queue never runs dry.
            self.expire_due(Instant::now());

            let received = match self.expiry.next_deadline() {
                Some(deadline) => requests.recv_deadline(deadline),
                None => requests.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Request::Shutdown) => break,
                Ok(request) => self.handle(request),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Engine request channel closed unexpectedly");
                    break;
                }
            }
        }

        info!(keys = self.values.len(), "Engine worker stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Get { key, resp } => {
                let _ = resp.send(self.values.get(&key).cloned());
            }
            Request::Set { key, value } => self.set(key, value),
            Request::Update {
                key,
                value,
                expected,
                resp,
            } => {
                let _ = resp.send(self.update(key, value, expected));
            }
            Request::Delete { key } => self.delete(&key),
            Request::Subscribe { id, path, sender } => {
                self.registry.register(id, &path, sender);
                debug!(subscriber = %id, path = %path, "Subscriber registered");
            }
            Request::Unsubscribe { id } => {
                if self.registry.unregister(id) {
                    debug!(subscriber = %id, "Subscriber unregistered");
                }
            }
            Request::Stats { resp } => {
                let _ = resp.send(self.stats());
            }
            Request::Shutdown => {}
        }
    }

    fn set(&mut self, key: Key, value: String) {
        let revision = match self.values.get(&key) {
            Some(entry) => entry.revision.next(),
            None => Revision(0),
        };
        self.commit(key, Entry { value, revision });
    }

    fn update(&mut self, key: Key, value: String, expected: Revision) -> bool {
        let next = match self.values.get(&key) {
            Some(entry) => entry.revision.next(),
            None => Revision(0),
        };
        if expected != next {
            trace!(key = %key, expected = %expected, next = %next, "Revision conflict");
            return false;
        }
        self.commit(
            key,
            Entry {
                value,
                revision: expected,
            },
        );
        true
    }

    /// Store a successful mutation, restart the key's idle timer, and fan out.
    fn commit(&mut self, key: Key, entry: Entry) {
        self.expiry.touch(&key, Instant::now());
        self.registry.notify(&key, &entry);
        self.values.insert(key, entry);
    }

    /// Deletions are not broadcast to subscribers.
    fn delete(&mut self, key: &Key) {
        self.values.remove(key);
        self.expiry.cancel(key);
    }

    fn expire_due(&mut self, now: Instant) {
        for key in self.expiry.pop_expired(now) {
            debug!(key = %key, "Key expired");
            self.values.remove(&key);
        }
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            keys: self.values.len(),
            subscription_paths: self.registry.path_count(),
            subscribers: self.registry.subscriber_count(),
            scheduled_expiries: self.expiry.len(),
            dropped_events: self.registry.dropped_events(),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    requests: Sender<Request>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    next_subscriber: AtomicU64,
}

impl EngineInner {
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("Engine worker panicked");
            }
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to the key-value engine.
///
/// Cloning is cheap; every clone talks to the same worker. The worker stops
/// when [`Engine::close`] is called or the last clone is dropped. After that
/// every operation returns [`KvError::Closed`].
///
/// # Example
///
/// ```ignore
/// let engine = Engine::new(EngineConfig::default())?;
/// let key = Key::parse("/fib")?;
///
/// engine.set(&key, "[0,1]")?;
/// let entry = engine.get(&key)?.unwrap();
/// assert_eq!(entry.revision, Revision(0));
///
/// assert!(engine.update(&key, "[1,1]", Revision(1))?);
/// assert!(!engine.update(&key, "[1,2]", Revision(1))?);
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Start a new engine with an empty store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let config = config.normalized();
        let (requests, receiver) = bounded(config.request_queue);

        let worker = Worker::new(&config);
        let handle = thread::Builder::new()
            .name("atomkv-engine".to_string())
            .spawn(move || worker.run(receiver))?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                requests,
                worker: Mutex::new(Some(handle)),
                closed: AtomicBool::new(false),
                next_subscriber: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn send(&self, request: Request) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        self.inner
            .requests
            .send(request)
            .map_err(|_| KvError::Closed)
    }

    /// Read a key. `None` if the key does not exist.
    pub fn get(&self, key: &Key) -> Result<Option<Entry>> {
        let (resp, rx) = bounded(1);
        self.send(Request::Get {
            key: key.clone(),
            resp,
        })?;
        rx.recv().map_err(|_| KvError::Closed)
    }

    /// Unconditional write. Returns once the request is queued.
    pub fn set(&self, key: &Key, value: impl Into<String>) -> Result<()> {
        self.send(Request::Set {
            key: key.clone(),
            value: value.into(),
        })
    }

    /// Compare-and-swap write.
    ///
    /// Succeeds only if `expected` is exactly one past the key's current
    /// revision, with an absent key counting as revision -1 (so `Revision(0)`
    /// creates it). Returns `false` on conflict without changing anything;
    /// callers re-read and retry.
    pub fn update(&self, key: &Key, value: impl Into<String>, expected: Revision) -> Result<bool> {
        let (resp, rx) = bounded(1);
        self.send(Request::Update {
            key: key.clone(),
            value: value.into(),
            expected,
            resp,
        })?;
        rx.recv().map_err(|_| KvError::Closed)
    }

    /// Remove a key whether or not it exists. Returns once the request is queued.
    pub fn delete(&self, key: &Key) -> Result<()> {
        self.send(Request::Delete { key: key.clone() })
    }

    /// Subscribe with the configured queue capacity.
    pub fn subscribe(&self, path: &SubscriptionPath) -> Result<SubscriberHandle> {
        self.subscribe_with_capacity(path, self.inner.config.subscriber_buffer)
    }

    /// Subscribe with an explicit queue capacity.
    ///
    /// The handle is usable immediately. Its registration is queued ahead of
    /// any request the caller sends afterwards, so it sees every later
    /// mutation of a matching key (capacity permitting).
    pub fn subscribe_with_capacity(
        &self,
        path: &SubscriptionPath,
        capacity: usize,
    ) -> Result<SubscriberHandle> {
        let id = SubscriptionId(self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = bounded(capacity.max(1));

        self.send(Request::Subscribe {
            id,
            path: path.clone(),
            sender,
        })?;

        Ok(SubscriberHandle {
            id,
            path: path.clone(),
            receiver,
        })
    }

    /// Stop delivering to a subscriber. Returns once the request is queued.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.send(Request::Unsubscribe { id })
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> Result<EngineStats> {
        let (resp, rx) = bounded(1);
        self.send(Request::Stats { resp })?;
        rx.recv().map_err(|_| KvError::Closed)
    }

    /// Stop the worker and wait for it to exit. Safe to call more than once.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn key(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let engine = engine();
        let fib = key("/fib");

        engine.set(&fib, "[0,1]").unwrap();
        let entry = engine.get(&fib).unwrap().unwrap();
        assert_eq!(entry.value, "[0,1]");
        assert_eq!(entry.revision, Revision(0));

        engine.set(&fib, "[1,1]").unwrap();
        assert_eq!(engine.get(&fib).unwrap().unwrap().revision, Revision(1));
    }

    #[test]
    fn test_get_missing() {
        let engine = engine();
        assert!(engine.get(&key("/nope")).unwrap().is_none());
    }

    #[test]
    fn test_update_cas() {
        let engine = engine();
        let k = key("/counter");

        // Absent key counts as revision -1.
        assert!(!engine.update(&k, "1", Revision(1)).unwrap());
        assert!(engine.update(&k, "0", Revision(0)).unwrap());
        assert!(!engine.update(&k, "x", Revision(0)).unwrap());
        assert!(engine.update(&k, "1", Revision(1)).unwrap());

        let entry = engine.get(&k).unwrap().unwrap();
        assert_eq!(entry.value, "1");
        assert_eq!(entry.revision, Revision(1));
    }

    #[test]
    fn test_delete_cancels_expiry() {
        let engine = engine();
        let k = key("/temp");
        engine.set(&k, "1").unwrap();
        assert_eq!(engine.stats().unwrap().scheduled_expiries, 1);

        engine.delete(&k).unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.scheduled_expiries, 0);

        // Deleting a missing key is fine.
        engine.delete(&k).unwrap();
        assert!(engine.get(&k).unwrap().is_none());
    }

    #[test]
    fn test_recreated_key_restarts_at_zero() {
        let engine = engine();
        let k = key("/again");
        engine.set(&k, "1").unwrap();
        engine.set(&k, "2").unwrap();
        engine.delete(&k).unwrap();
        engine.set(&k, "3").unwrap();
        assert_eq!(engine.get(&k).unwrap().unwrap().revision, Revision(0));
    }

    #[test]
    fn test_zero_config_uses_defaults() {
        let engine = Engine::new(EngineConfig {
            subscriber_buffer: 0,
            expiry: Duration::ZERO,
            request_queue: 0,
        })
        .unwrap();
        assert_eq!(engine.config().subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
        assert_eq!(engine.config().expiry, DEFAULT_EXPIRY);
        assert_eq!(engine.config().request_queue, DEFAULT_REQUEST_QUEUE);
    }

    #[test]
    fn test_unbounded_expiry_keeps_worker_alive() {
        let engine = Engine::new(EngineConfig {
            expiry: Duration::MAX,
            ..Default::default()
        })
        .unwrap();
        let k = key("/forever");

        engine.set(&k, "1").unwrap();
        assert!(engine.update(&k, "2", Revision(1)).unwrap());
        assert_eq!(engine.get(&k).unwrap().unwrap().value, "2");

        let stats = engine.stats().unwrap();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.scheduled_expiries, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = engine();
        let clone = engine.clone();
        engine.close();
        engine.close();
        assert!(clone.is_closed());
        assert!(matches!(clone.get(&key("/a")), Err(KvError::Closed)));
    }

    #[test]
    fn test_unsubscribe_removes_empty_path() {
        let engine = engine();
        let path = SubscriptionPath::parse("/room/").unwrap();
        let a = engine.subscribe(&path).unwrap();
        let b = engine.subscribe(&path).unwrap();
        assert_ne!(a.id(), b.id());

        let stats = engine.stats().unwrap();
        assert_eq!(stats.subscription_paths, 1);
        assert_eq!(stats.subscribers, 2);

        engine.unsubscribe(a.id()).unwrap();
        assert_eq!(engine.stats().unwrap().subscription_paths, 1);
        engine.unsubscribe(b.id()).unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.subscription_paths, 0);
        assert_eq!(stats.subscribers, 0);
    }
}

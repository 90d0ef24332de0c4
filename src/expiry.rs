//! Idle-expiry schedule shared by all keys.
//!
//! Every live key has exactly one deadline, pushed back on each successful
//! write and removed on delete. The engine worker asks for the earliest
//! deadline, waits for requests until then, and evicts whatever is due.
//!
//! Deadlines live in a map; the heap only orders them. Heap entries that no
//! longer match the map are stale and skipped when they surface.

use crate::keys::Key;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Default idle time before a key is evicted.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Heap size below which stale entries are never compacted away.
const COMPACT_THRESHOLD: usize = 1024;

pub(crate) struct ExpirySchedule {
    ttl: Duration,
    deadlines: HashMap<Key, Instant>,
    heap: BinaryHeap<Reverse<(Instant, Key)>>,
}

impl ExpirySchedule {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            deadlines: HashMap::new(),
            heap: BinaryHeap::new(),
        }
    }

    /// Start or restart the idle timer for `key`.
    ///
    /// A deadline too far out for `Instant` means the key never expires.
    pub fn touch(&mut self, key: &Key, now: Instant) {
        let Some(deadline) = now.checked_add(self.ttl) else {
            self.deadlines.remove(key);
            return;
        };
        self.deadlines.insert(key.clone(), deadline);
        self.heap.push(Reverse((deadline, key.clone())));

        if self.heap.len() > COMPACT_THRESHOLD && self.heap.len() > 2 * self.deadlines.len() {
            self.compact();
        }
    }

    /// Forget the timer for `key`. Returns whether one was pending.
    pub fn cancel(&mut self, key: &Key) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Earliest live deadline, discarding stale heap entries on the way.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, key))) = self.heap.peek() {
            if self.deadlines.get(key) == Some(deadline) {
                return Some(*deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Remove and return every key whose deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Key> {
        let mut expired = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }
            if let Some(Reverse((_, key))) = self.heap.pop() {
                self.deadlines.remove(&key);
                expired.push(key);
            }
        }
        expired
    }

    /// Keys with a pending deadline.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    fn compact(&mut self) {
        self.heap = self
            .deadlines
            .iter()
            .map(|(key, deadline)| Reverse((*deadline, key.clone())))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn test_expires_after_ttl() {
        let mut schedule = ExpirySchedule::new(Duration::from_secs(10));
        let t0 = Instant::now();
        schedule.touch(&key("/a"), t0);
        schedule.touch(&key("/b"), t0 + Duration::from_secs(5));

        assert_eq!(schedule.next_deadline(), Some(t0 + Duration::from_secs(10)));
        assert!(schedule.pop_expired(t0 + Duration::from_secs(9)).is_empty());
        assert_eq!(schedule.pop_expired(t0 + Duration::from_secs(10)), vec![key("/a")]);
        assert_eq!(schedule.pop_expired(t0 + Duration::from_secs(20)), vec![key("/b")]);
        assert_eq!(schedule.next_deadline(), None);
        assert_eq!(schedule.len(), 0);
    }

    #[test]
    fn test_touch_pushes_deadline_back() {
        let mut schedule = ExpirySchedule::new(Duration::from_secs(10));
        let t0 = Instant::now();
        schedule.touch(&key("/a"), t0);
        schedule.touch(&key("/a"), t0 + Duration::from_secs(8));

        // The first deadline is stale now.
        assert_eq!(schedule.next_deadline(), Some(t0 + Duration::from_secs(18)));
        assert!(schedule.pop_expired(t0 + Duration::from_secs(12)).is_empty());
        assert_eq!(schedule.pop_expired(t0 + Duration::from_secs(18)), vec![key("/a")]);
    }

    #[test]
    fn test_cancel_removes_deadline() {
        let mut schedule = ExpirySchedule::new(Duration::from_secs(1));
        let t0 = Instant::now();
        schedule.touch(&key("/a"), t0);
        assert!(schedule.cancel(&key("/a")));
        assert!(!schedule.cancel(&key("/a")));

        assert_eq!(schedule.len(), 0);
        assert_eq!(schedule.next_deadline(), None);
        assert!(schedule.pop_expired(t0 + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_recreated_key_gets_fresh_deadline() {
        let mut schedule = ExpirySchedule::new(Duration::from_secs(10));
        let t0 = Instant::now();
        schedule.touch(&key("/a"), t0);
        schedule.cancel(&key("/a"));
        schedule.touch(&key("/a"), t0 + Duration::from_secs(7));

        assert!(schedule.pop_expired(t0 + Duration::from_secs(10)).is_empty());
        assert_eq!(schedule.pop_expired(t0 + Duration::from_secs(17)), vec![key("/a")]);
    }

    #[test]
    fn test_unrepresentable_deadline_never_expires() {
        let mut schedule = ExpirySchedule::new(Duration::MAX);
        let t0 = Instant::now();
        schedule.touch(&key("/a"), t0);
        schedule.touch(&key("/a"), t0 + Duration::from_secs(1));

        assert_eq!(schedule.len(), 0);
        assert_eq!(schedule.next_deadline(), None);
        assert!(schedule.pop_expired(t0 + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn test_stale_entries_are_compacted() {
        let mut schedule = ExpirySchedule::new(Duration::from_secs(10));
        let t0 = Instant::now();
        for i in 0..(COMPACT_THRESHOLD as u64 * 3) {
            schedule.touch(&key("/hot"), t0 + Duration::from_millis(i));
        }
        assert_eq!(schedule.len(), 1);
        assert!(schedule.heap.len() <= COMPACT_THRESHOLD + 1);
    }
}

//! In-memory durable-store primitives.
//!
//! Two shapes back the workflow engine: a TTL key-value map for live
//! workflow instances, and a time-ordered queue for scheduled jobs where a
//! pop atomically removes every entry due at or before a given instant.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Key-value map with per-key TTL. Expired entries are dropped lazily on
/// read and in bulk via [`TtlMap::evict_expired`].
pub struct TtlMap<V: Clone> {
    entries: DashMap<String, TtlEntry<V>>,
}

struct TtlEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V: Clone> TtlMap<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn put(&self, key: String, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            TtlEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Returns the live value for the key, dropping it if expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > entry.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    /// Remove expired entries. Call periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= entry.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Time-ordered queue keyed by execution timestamp. Insertion order breaks
/// ties so equal timestamps pop in FIFO order.
pub struct TimeQueue<V: Clone> {
    inner: Mutex<TimeQueueInner<V>>,
}

struct TimeQueueInner<V> {
    entries: BTreeMap<(i64, u64), V>,
    seq: u64,
}

impl<V: Clone> TimeQueue<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TimeQueueInner {
                entries: BTreeMap::new(),
                seq: 0,
            }),
        }
    }

    pub fn push(&self, execute_at: DateTime<Utc>, value: V) {
        let mut inner = self.inner.lock();
        let seq = inner.seq;
        inner.seq += 1;
        inner
            .entries
            .insert((execute_at.timestamp_millis(), seq), value);
    }

    /// Atomically removes and returns every entry due at or before `now`,
    /// in time order. Each entry is returned exactly once.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<V> {
        let mut inner = self.inner.lock();
        let not_due = inner
            .entries
            .split_off(&(now.timestamp_millis() + 1, 0));
        let due = std::mem::replace(&mut inner.entries, not_due);
        due.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl<V: Clone> Default for TimeQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_map_expiry() {
        let map: TtlMap<u32> = TtlMap::new();
        map.put("live".into(), 1, Duration::from_secs(3600));
        map.put("dead".into(), 2, Duration::from_millis(0));

        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(map.get("live"), Some(1));
        assert_eq!(map.get("dead"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_ttl_map_evict_expired() {
        let map: TtlMap<u32> = TtlMap::new();
        map.put("a".into(), 1, Duration::from_millis(0));
        map.put("b".into(), 2, Duration::from_secs(3600));

        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(map.evict_expired(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_time_queue_pops_only_due() {
        let queue: TimeQueue<&str> = TimeQueue::new();
        let now = Utc::now();
        queue.push(now - chrono::Duration::minutes(5), "past");
        queue.push(now, "present");
        queue.push(now + chrono::Duration::minutes(5), "future");

        let due = queue.pop_due(now);
        assert_eq!(due, vec!["past", "present"]);
        assert_eq!(queue.len(), 1);

        // A second pop at the same instant returns nothing new.
        assert!(queue.pop_due(now).is_empty());
    }

    #[test]
    fn test_time_queue_fifo_on_equal_timestamps() {
        let queue: TimeQueue<u32> = TimeQueue::new();
        let at = Utc::now();
        queue.push(at, 1);
        queue.push(at, 2);
        queue.push(at, 3);

        assert_eq!(queue.pop_due(at), vec![1, 2, 3]);
    }
}

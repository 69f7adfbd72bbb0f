//! LRU+TTL cache for classified intents (§4.9), keyed on normalized user text.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry {
    value: bool,
    expires_at: Instant,
}

struct Inner {
    map: HashMap<String, Entry>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

/// Bounded, time-expiring cache of normalized-text -> is-search-intent decisions.
pub struct IntentCache {
    inner: Mutex<Inner>,
}

impl IntentCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
                ttl,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        match inner.map.get(key) {
            Some(entry) if entry.expires_at > now => {
                let value = entry.value;
                inner.order.retain(|k| k != key);
                inner.order.push_back(key.to_string());
                Some(value)
            }
            Some(_) => {
                inner.map.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, value: bool) {
        let mut inner = self.inner.lock().unwrap();
        let ttl = inner.ttl;
        if inner.map.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.map.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.map.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}

impl Default for IntentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_recorded_value() {
        let c = IntentCache::new();
        c.set("what is rust".to_string(), true);
        assert_eq!(c.get("what is rust"), Some(true));
        assert_eq!(c.get("unknown"), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let c = IntentCache::with_capacity_and_ttl(100, Duration::from_millis(10));
        c.set("key".to_string(), true);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(c.get("key"), None);
    }

    #[test]
    fn exceeding_capacity_evicts_lru() {
        let c = IntentCache::with_capacity_and_ttl(2, DEFAULT_TTL);
        c.set("a".to_string(), true);
        c.set("b".to_string(), false);
        c.set("c".to_string(), true);
        assert_eq!(c.get("a"), None);
        assert_eq!(c.len(), 2);
    }
}

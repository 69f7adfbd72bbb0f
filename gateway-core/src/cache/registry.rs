//! Cache registry (§4.4): node -> cached-fingerprint index, grounded in the
//! teacher's `Cache` trait + `InMemoryCache` (single `RwLock`-guarded map,
//! mutation methods that read-then-write atomically from the caller's view).
//!
//! Invariant (§8): for every hash `h`,
//! `|{n : hash_index[h] contains n}| = |{n : registry[n].hash == h}|`.

use crate::node::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default `maxCacheAgeSec` (§6 `cache.maxCacheAgeSec`): entries older than
/// this are treated as absent on read (§4.4 invariant 3).
pub const DEFAULT_MAX_CACHE_AGE_SEC: u64 = 300;

/// One node's cache state (§4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub node_id: NodeId,
    pub node_url: String,
    pub system_prompt_hash: String,
    pub tokens: u32,
    /// Wall-clock milliseconds since the epoch.
    pub last_updated: u64,
    pub hit_rate: f64,
}

impl CacheEntry {
    pub fn new(
        node_id: NodeId,
        node_url: impl Into<String>,
        system_prompt_hash: impl Into<String>,
        tokens: u32,
    ) -> Self {
        Self {
            node_id,
            node_url: node_url.into(),
            system_prompt_hash: system_prompt_hash.into(),
            tokens,
            last_updated: now_ms(),
            hit_rate: 0.0,
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Default)]
struct Inner {
    by_node: HashMap<NodeId, CacheEntry>,
    by_hash: HashMap<String, HashSet<NodeId>>,
}

impl Inner {
    fn remove(&mut self, node_id: &NodeId) -> Option<CacheEntry> {
        let removed = self.by_node.remove(node_id)?;
        if let Some(nodes) = self.by_hash.get_mut(&removed.system_prompt_hash) {
            nodes.remove(node_id);
            if nodes.is_empty() {
                self.by_hash.remove(&removed.system_prompt_hash);
            }
        }
        Some(removed)
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.remove(&entry.node_id);
        self.by_hash
            .entry(entry.system_prompt_hash.clone())
            .or_default()
            .insert(entry.node_id.clone());
        self.by_node.insert(entry.node_id.clone(), entry);
    }
}

/// Per-node cache-fingerprint index (§4.4). Single `RwLock`-guarded map of
/// maps, matching the teacher's `InMemoryCache`: one lock, short critical
/// sections, no cross-structure deadlock risk.
pub struct CacheRegistry {
    inner: RwLock<Inner>,
    max_age_sec: u64,
}

impl CacheRegistry {
    pub fn new(max_age_sec: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_age_sec,
        }
    }

    /// Replaces (or inserts) the entry for `entry.node_id`. If the node
    /// previously held a different hash, it moves across hash buckets
    /// atomically from the caller's perspective.
    pub fn set(&self, entry: CacheEntry) {
        self.inner.write().unwrap().insert(entry);
    }

    pub fn get(&self, node_id: &NodeId) -> Option<CacheEntry> {
        self.inner.read().unwrap().by_node.get(node_id).cloned()
    }

    pub fn delete(&self, node_id: &NodeId) -> Option<CacheEntry> {
        self.inner.write().unwrap().remove(node_id)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.by_node.clear();
        inner.by_hash.clear();
    }

    /// Nodes currently known to hold the given prompt fingerprint, most
    /// recently updated first.
    pub fn find_nodes_with_cache(&self, hash: &str) -> Vec<CacheEntry> {
        let inner = self.inner.read().unwrap();
        let Some(node_ids) = inner.by_hash.get(hash) else {
            return Vec::new();
        };
        let mut entries: Vec<CacheEntry> = node_ids
            .iter()
            .filter_map(|id| inner.by_node.get(id).cloned())
            .collect();
        entries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        entries
    }

    pub fn get_all_cached_hashes(&self) -> Vec<String> {
        self.inner.read().unwrap().by_hash.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every entry with `now - last_updated > max_age_sec`, updating
    /// both indices, and returns the number of entries purged. Called
    /// opportunistically before and during routing (§4.4).
    pub fn expire_stale_entries(&self) -> usize {
        let now = now_ms();
        let max_age_ms = self.max_age_sec.saturating_mul(1000);
        let mut inner = self.inner.write().unwrap();
        let stale: Vec<NodeId> = inner
            .by_node
            .iter()
            .filter(|(_, entry)| now.saturating_sub(entry.last_updated) > max_age_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.remove(id);
        }
        stale.len()
    }
}

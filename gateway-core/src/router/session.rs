//! Bounded session-stickiness map (§4.6): `session_id -> NodeId`, capped at
//! 10,000 entries with least-recently-used eviction. A hand-rolled ring
//! rather than an external LRU crate: the whole structure is a HashMap plus
//! an access-order deque, which is all this single call site needs.

use crate::node::NodeId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 10_000;

struct Inner {
    map: HashMap<String, NodeId>,
    order: VecDeque<String>,
    capacity: usize,
}

/// Tracks which node last served each session id, so the router can prefer
/// it on the next request from the same session (§4.6).
pub struct SessionStickiness {
    inner: Mutex<Inner>,
}

impl SessionStickiness {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<NodeId> {
        let mut inner = self.inner.lock().unwrap();
        let node = inner.map.get(session_id).cloned();
        if node.is_some() {
            inner.order.retain(|s| s != session_id);
            inner.order.push_back(session_id.to_string());
        }
        node
    }

    pub fn record(&self, session_id: &str, node_id: NodeId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.contains_key(session_id) {
            inner.order.retain(|s| s != session_id);
        } else if inner.map.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.order.push_back(session_id.to_string());
        inner.map.insert(session_id.to_string(), node_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStickiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: recording a session then looking it up returns the same node.
    #[test]
    fn record_then_get_returns_recorded_node() {
        let s = SessionStickiness::new();
        s.record("sess1", NodeId::new("n1"));
        assert_eq!(s.get("sess1"), Some(NodeId::new("n1")));
        assert!(s.get("unknown").is_none());
    }

    /// **Scenario**: exceeding capacity evicts the least-recently-used session.
    #[test]
    fn exceeding_capacity_evicts_lru() {
        let s = SessionStickiness::with_capacity(2);
        s.record("a", NodeId::new("n1"));
        s.record("b", NodeId::new("n2"));
        s.record("c", NodeId::new("n3"));
        assert!(s.get("a").is_none(), "a should have been evicted");
        assert_eq!(s.get("b"), Some(NodeId::new("n2")));
        assert_eq!(s.get("c"), Some(NodeId::new("n3")));
        assert_eq!(s.len(), 2);
    }

    /// **Scenario**: reading a session refreshes its recency, protecting it from the
    /// next eviction.
    #[test]
    fn get_refreshes_recency() {
        let s = SessionStickiness::with_capacity(2);
        s.record("a", NodeId::new("n1"));
        s.record("b", NodeId::new("n2"));
        let _ = s.get("a"); // a is now most-recently-used
        s.record("c", NodeId::new("n3")); // should evict b, not a
        assert_eq!(s.get("a"), Some(NodeId::new("n1")));
        assert!(s.get("b").is_none());
    }
}

//! Router / dispatcher (§4.6): candidate scoring, selection, and dispatch
//! with retries. Outbound-call shape (attempt, record latency, classify
//! pre-commit vs. committed failure) is grounded in the teacher's
//! `ChatOpenAI` client.

mod session;

pub use session::SessionStickiness;

use crate::cache::CacheRegistry;
use crate::error::RouterError;
use crate::health::{HealthState, NodeHealthTracker};
use crate::node::{Node, NodeId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fallback-tier ordering strategy (§4.6, §6 `routing.strategy`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingStrategy {
    CacheAware,
    LeastLoaded,
    RoundRobin,
}

#[derive(Clone, Copy, Debug)]
pub struct RouterConfig {
    pub strategy: RoutingStrategy,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::CacheAware,
            max_retries: 1,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of one dispatch attempt against a node, up to (but not including)
/// mid-stream behavior: once an attempt is `Committed`, the router stops
/// retrying even if the stream later fails (§4.6).
pub enum AttemptOutcome {
    Committed {
        latency_ms: u64,
        cache_hit: Option<bool>,
    },
    PreCommitFailure {
        error: String,
    },
}

/// Issues the translated OpenAI request against one node. Implemented by the
/// protocol/serve layer; the router only needs to know whether an attempt
/// committed (first byte received) or failed before that point.
#[async_trait]
pub trait NodeDispatcher: Send + Sync {
    async fn attempt(&self, node: &Node, cancel: CancellationToken) -> AttemptOutcome;
}

/// One node's current load/score snapshot, for diagnostics (`Router::snapshot`).
#[derive(Clone, Debug, serde::Serialize)]
pub struct NodeSnapshot {
    pub node_id: NodeId,
    pub state: HealthState,
    pub in_flight: i64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

/// Cache-aware, health-tracked dispatcher (§4.6).
pub struct Router {
    nodes: Vec<Node>,
    health: Arc<NodeHealthTracker>,
    cache: Arc<CacheRegistry>,
    in_flight: DashMap<NodeId, AtomicI64>,
    session: SessionStickiness,
    round_robin_cursor: AtomicUsize,
    cfg: RouterConfig,
}

impl Router {
    pub fn new(
        nodes: Vec<Node>,
        health: Arc<NodeHealthTracker>,
        cache: Arc<CacheRegistry>,
        cfg: RouterConfig,
    ) -> Self {
        let in_flight = DashMap::new();
        for node in &nodes {
            in_flight.insert(node.id.clone(), AtomicI64::new(0));
        }
        Self {
            nodes,
            health,
            cache,
            in_flight,
            session: SessionStickiness::new(),
            round_robin_cursor: AtomicUsize::new(0),
            cfg,
        }
    }

    fn in_flight_count(&self, node_id: &NodeId) -> i64 {
        self.in_flight
            .get(node_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn sort_tier(&self, mut ids: Vec<NodeId>) -> Vec<NodeId> {
        ids.sort_by(|a, b| {
            self.in_flight_count(a)
                .cmp(&self.in_flight_count(b))
                .then_with(|| {
                    self.health
                        .avg_latency_ms(a)
                        .partial_cmp(&self.health.avg_latency_ms(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.cmp(b))
        });
        ids
    }

    /// Builds the ordered candidate list for a request (§4.6 steps 1-6).
    pub fn select_candidates(&self, system_prompt_hash: &str, session_id: Option<&str>) -> Vec<NodeId> {
        self.cache.expire_stale_entries();

        let cached: HashSet<NodeId> = self
            .cache
            .find_nodes_with_cache(system_prompt_hash)
            .into_iter()
            .map(|e| e.node_id)
            .collect();

        let eligible = |id: &NodeId| self.health.is_eligible(id);

        match self.cfg.strategy {
            RoutingStrategy::CacheAware => {
                let mut c: Vec<NodeId> = cached.iter().filter(|id| eligible(id)).cloned().collect();
                c = self.sort_tier(c);
                if let Some(sid) = session_id {
                    if let Some(sticky) = self.session.get(sid) {
                        if eligible(&sticky) {
                            c.retain(|id| id != &sticky);
                            c.insert(0, sticky);
                        }
                    }
                }
                let a: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .map(|n| n.id.clone())
                    .filter(|id| self.health.state(id) == HealthState::Healthy && !cached.contains(id))
                    .collect();
                let b: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .map(|n| n.id.clone())
                    .filter(|id| self.health.state(id) == HealthState::Degraded && !cached.contains(id))
                    .collect();
                c.into_iter()
                    .chain(self.sort_tier(a))
                    .chain(self.sort_tier(b))
                    .collect()
            }
            RoutingStrategy::LeastLoaded => {
                let eligible_ids: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .map(|n| n.id.clone())
                    .filter(|id| eligible(id))
                    .collect();
                self.sort_tier(eligible_ids)
            }
            RoutingStrategy::RoundRobin => {
                let eligible_ids: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .map(|n| n.id.clone())
                    .filter(|id| eligible(id))
                    .collect();
                if eligible_ids.is_empty() {
                    return eligible_ids;
                }
                let start = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst) % eligible_ids.len();
                eligible_ids[start..]
                    .iter()
                    .chain(eligible_ids[..start].iter())
                    .cloned()
                    .collect()
            }
        }
    }

    fn node_by_id(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Attempts candidates in order, up to `max_retries + 1` total attempts,
    /// stopping at the first committed attempt (§4.6 Dispatch/Failure policy).
    pub async fn dispatch(
        &self,
        system_prompt_hash: &str,
        session_id: Option<&str>,
        dispatcher: &dyn NodeDispatcher,
        cancel: CancellationToken,
    ) -> Result<NodeId, RouterError> {
        let candidates = self.select_candidates(system_prompt_hash, session_id);
        if candidates.is_empty() {
            return Err(RouterError::NoEligibleNode);
        }

        let max_attempts = self.cfg.max_retries + 1;
        let mut causes = Vec::new();

        for node_id in candidates.into_iter().take(max_attempts) {
            if cancel.is_cancelled() {
                break;
            }
            let Some(node) = self.node_by_id(&node_id) else {
                continue;
            };
            self.in_flight
                .entry(node_id.clone())
                .or_insert_with(|| AtomicI64::new(0))
                .fetch_add(1, Ordering::SeqCst);

            let outcome = dispatcher.attempt(node, cancel.clone()).await;

            self.in_flight
                .entry(node_id.clone())
                .or_insert_with(|| AtomicI64::new(0))
                .fetch_sub(1, Ordering::SeqCst);

            match outcome {
                AttemptOutcome::Committed { latency_ms, cache_hit } => {
                    self.health.record_success(&node_id, latency_ms);
                    if cache_hit == Some(true) {
                        if let Some(mut entry) = self.cache.get(&node_id) {
                            entry.last_updated = crate::cache::registry::now_ms();
                            self.cache.set(entry);
                        }
                    }
                    if let Some(sid) = session_id {
                        self.session.record(sid, node_id.clone());
                    }
                    return Ok(node_id);
                }
                AttemptOutcome::PreCommitFailure { error } => {
                    self.health.record_failure(&node_id, error.clone());
                    let pre_commit = RouterError::PreCommit {
                        node_id: node_id.to_string(),
                        cause: error,
                    };
                    causes.push(pre_commit.to_string());
                    tokio::time::sleep(self.cfg.retry_delay).await;
                }
            }
        }

        Err(RouterError::AllAttemptsFailed {
            attempts: causes.len(),
            causes,
        })
    }

    /// Diagnostic snapshot of every known node's routing-relevant state.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|n| NodeSnapshot {
                node_id: n.id.clone(),
                state: self.health.state(&n.id),
                in_flight: self.in_flight_count(&n.id),
                avg_latency_ms: self.health.avg_latency_ms(&n.id),
                success_rate: self.health.success_rate(&n.id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::events::NullEvents;
    use crate::health::HealthConfig;
    use std::sync::Mutex as StdMutex;

    fn make_router(nodes: Vec<Node>, cfg: RouterConfig) -> (Router, Arc<NodeHealthTracker>, Arc<CacheRegistry>) {
        let health = Arc::new(NodeHealthTracker::new(HealthConfig::default(), Arc::new(NullEvents)));
        let cache = Arc::new(CacheRegistry::new(300));
        let router = Router::new(nodes, health.clone(), cache.clone(), cfg);
        (router, health, cache)
    }

    struct ScriptedDispatcher {
        outcomes: StdMutex<std::collections::HashMap<String, AttemptOutcome>>,
    }

    #[async_trait]
    impl NodeDispatcher for ScriptedDispatcher {
        async fn attempt(&self, node: &Node, _cancel: CancellationToken) -> AttemptOutcome {
            self.outcomes
                .lock()
                .unwrap()
                .remove(node.id.as_str())
                .unwrap_or(AttemptOutcome::PreCommitFailure {
                    error: "no script".into(),
                })
        }
    }

    /// **Scenario** (§8 scenario 1, cache-aware routing): three HEALTHY nodes, a cache
    /// entry for n2 under hash H, request fingerprint == H. Expected: n2 is selected
    /// first.
    #[tokio::test]
    async fn cache_aware_routing_prefers_cached_node() {
        let nodes = vec![
            Node::new("n1", "http://n1"),
            Node::new("n2", "http://n2"),
            Node::new("n3", "http://n3"),
        ];
        let (router, health, cache) = make_router(nodes, RouterConfig::default());
        for id in ["n1", "n2", "n3"] {
            health.record_success(&NodeId::new(id), 10);
        }
        cache.set(CacheEntry::new(NodeId::new("n2"), "http://n2", "H(sysA)", 100));
        let candidates = router.select_candidates("H(sysA)", None);
        assert_eq!(candidates[0], NodeId::new("n2"));
    }

    /// **Scenario** (§8 scenario 5, failover): two HEALTHY nodes, maxRetries:1. First
    /// attempt fails pre-commit; second node succeeds; dispatch returns Ok with the
    /// second node, no error surfaced to the caller.
    #[tokio::test]
    async fn failover_to_second_candidate_on_precommit_failure() {
        let nodes = vec![Node::new("n1", "http://n1"), Node::new("n2", "http://n2")];
        let cfg = RouterConfig {
            max_retries: 1,
            ..RouterConfig::default()
        };
        let (router, health, _cache) = make_router(nodes, cfg);
        health.record_success(&NodeId::new("n1"), 10);
        health.record_success(&NodeId::new("n2"), 10);

        let mut outcomes = std::collections::HashMap::new();
        outcomes.insert(
            "n1".to_string(),
            AttemptOutcome::PreCommitFailure {
                error: "503".into(),
            },
        );
        outcomes.insert(
            "n2".to_string(),
            AttemptOutcome::Committed {
                latency_ms: 20,
                cache_hit: None,
            },
        );
        let dispatcher = ScriptedDispatcher {
            outcomes: StdMutex::new(outcomes),
        };
        let result = router
            .dispatch("H(anything)", None, &dispatcher, CancellationToken::new())
            .await;
        assert_eq!(result.unwrap(), NodeId::new("n2"));
    }

    /// **Scenario**: when every candidate fails pre-commit, dispatch surfaces an
    /// aggregate AllAttemptsFailed error listing every cause.
    #[tokio::test]
    async fn all_candidates_failing_surfaces_aggregate_error() {
        let nodes = vec![Node::new("n1", "http://n1")];
        let cfg = RouterConfig {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            ..RouterConfig::default()
        };
        let (router, health, _cache) = make_router(nodes, cfg);
        health.record_success(&NodeId::new("n1"), 10);
        let mut outcomes = std::collections::HashMap::new();
        outcomes.insert(
            "n1".to_string(),
            AttemptOutcome::PreCommitFailure {
                error: "boom".into(),
            },
        );
        let dispatcher = ScriptedDispatcher {
            outcomes: StdMutex::new(outcomes),
        };
        let result = router
            .dispatch("H(x)", None, &dispatcher, CancellationToken::new())
            .await;
        match result {
            Err(RouterError::AllAttemptsFailed { attempts, causes }) => {
                assert_eq!(attempts, 1);
                assert_eq!(
                    causes,
                    vec![RouterError::PreCommit {
                        node_id: "n1".to_string(),
                        cause: "boom".to_string(),
                    }
                    .to_string()]
                );
            }
            other => panic!("expected AllAttemptsFailed, got {other:?}"),
        }
    }

    /// **Scenario**: with no eligible nodes at all, dispatch fails fast with
    /// NoEligibleNode and never calls the dispatcher.
    #[tokio::test]
    async fn no_eligible_nodes_fails_fast() {
        let nodes = vec![Node::new("n1", "http://n1")];
        let (router, _health, _cache) = make_router(nodes, RouterConfig::default());
        let dispatcher = ScriptedDispatcher {
            outcomes: StdMutex::new(std::collections::HashMap::new()),
        };
        let result = router
            .dispatch("H(x)", None, &dispatcher, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RouterError::NoEligibleNode)));
    }

    /// **Scenario**: a sticky session whose node is still eligible is placed at the
    /// head of the cache tier, ahead of the natural in-flight/latency sort.
    #[tokio::test]
    async fn session_stickiness_overrides_cache_tier_sort() {
        let nodes = vec![Node::new("n1", "http://n1"), Node::new("n2", "http://n2")];
        let (router, health, cache) = make_router(nodes, RouterConfig::default());
        health.record_success(&NodeId::new("n1"), 5);
        health.record_success(&NodeId::new("n2"), 50);
        cache.set(CacheEntry::new(NodeId::new("n1"), "http://n1", "H", 10));
        cache.set(CacheEntry::new(NodeId::new("n2"), "http://n2", "H", 10));
        // Without stickiness, n1 (lower latency) sorts first.
        let default_order = router.select_candidates("H", None);
        assert_eq!(default_order[0], NodeId::new("n1"));
        router.session.record("sess1", NodeId::new("n2"));
        let sticky_order = router.select_candidates("H", Some("sess1"));
        assert_eq!(sticky_order[0], NodeId::new("n2"));
    }
}

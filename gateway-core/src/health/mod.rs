//! Node health tracker (§4.2): per-node state machine over rolling-window
//! metrics, with exponential-backoff recovery.

mod monitor;

pub use monitor::{ClusterHealthMonitor, ProbeOutcome, Prober, ReqwestProber};

use crate::events::{Events, StatusChange};
use crate::metrics::RollingWindow;
use crate::node::NodeId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Node health state (§3). A node is eligible for routing iff
/// `state ∈ {Healthy, Degraded}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Initializing,
    Healthy,
    Degraded,
    Unhealthy,
    Offline,
}

impl HealthState {
    /// §3 invariant: a node is eligible for routing iff state ∈ {HEALTHY, DEGRADED}.
    pub fn is_eligible(self) -> bool {
        matches!(self, HealthState::Healthy | HealthState::Degraded)
    }
}

/// Tuning knobs for the tracker (§4.2, §6 `health` config section).
#[derive(Clone, Copy, Debug)]
pub struct HealthConfig {
    pub max_consecutive_failures: u32,
    pub unhealthy_threshold: f64,
    pub recovery_threshold: f64,
    pub window: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            unhealthy_threshold: 0.5,
            recovery_threshold: 0.8,
            window: crate::metrics::DEFAULT_WINDOW,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Per-node backoff state (§3): doubles on failure, capped, reset on recovery.
#[derive(Clone, Copy, Debug)]
struct BackoffState {
    delay: Duration,
    last_failure: Option<Instant>,
}

impl BackoffState {
    fn new(initial: Duration) -> Self {
        Self {
            delay: initial,
            last_failure: None,
        }
    }
}

struct NodeState {
    state: HealthState,
    window: RollingWindow,
    consecutive_failures: u32,
    consecutive_successes: u32,
    backoff: BackoffState,
    last_error: Option<String>,
}

impl NodeState {
    fn new(cfg: &HealthConfig) -> Self {
        Self {
            state: HealthState::Initializing,
            window: RollingWindow::new(cfg.window),
            consecutive_failures: 0,
            consecutive_successes: 0,
            backoff: BackoffState::new(cfg.initial_backoff),
            last_error: None,
        }
    }
}

/// Health-tracked, per-node state machine (§4.2). Mutable state lives behind
/// one `Mutex` per node (design note §9: "prefer one lock per node ... over
/// a single global lock"); the outer map is a `DashMap` for lock-free lookup.
pub struct NodeHealthTracker {
    cfg: HealthConfig,
    nodes: DashMap<NodeId, Mutex<NodeState>>,
    events: Arc<dyn Events>,
}

impl NodeHealthTracker {
    pub fn new(cfg: HealthConfig, events: Arc<dyn Events>) -> Self {
        Self {
            cfg,
            nodes: DashMap::new(),
            events,
        }
    }

    fn entry(&self, node_id: &NodeId) -> dashmap::mapref::one::Ref<'_, NodeId, Mutex<NodeState>> {
        if !self.nodes.contains_key(node_id) {
            self.nodes
                .entry(node_id.clone())
                .or_insert_with(|| Mutex::new(NodeState::new(&self.cfg)));
        }
        self.nodes.get(node_id).expect("just inserted")
    }

    pub fn state(&self, node_id: &NodeId) -> HealthState {
        self.entry(node_id).lock().unwrap().state
    }

    pub fn is_eligible(&self, node_id: &NodeId) -> bool {
        self.state(node_id).is_eligible()
    }

    pub fn avg_latency_ms(&self, node_id: &NodeId) -> f64 {
        self.entry(node_id).lock().unwrap().window.snapshot().avg_latency_ms
    }

    pub fn success_rate(&self, node_id: &NodeId) -> f64 {
        self.entry(node_id).lock().unwrap().window.snapshot().success_rate
    }

    /// Explicit operator action (§4.2): any state -> OFFLINE.
    pub fn mark_offline(&self, node_id: &NodeId, reason: impl Into<String>) {
        self.transition(node_id, HealthState::Offline, reason.into());
    }

    fn transition(&self, node_id: &NodeId, new_state: HealthState, reason: String) {
        let previous = {
            let guard = self.entry(node_id);
            let mut st = guard.lock().unwrap();
            let previous = st.state;
            st.state = new_state;
            previous
        };
        if previous != new_state {
            tracing::info!(node_id = %node_id, from = ?previous, to = ?new_state, reason = %reason, "node health transition");
            let events = self.events.clone();
            let change = StatusChange {
                node_id: node_id.clone(),
                previous,
                new_state,
                reason,
            };
            crate::events::call_guarded("on_status_change", move || {
                events.on_status_change(change)
            });
        }
    }

    /// Records a successful outcome (probe or real request, §4.3) and runs
    /// the HEALTHY/DEGRADED/UNHEALTHY transition table (§4.2).
    pub fn record_success(&self, node_id: &NodeId, latency_ms: u64) {
        let (next, reason, was_initializing) = {
            let guard = self.entry(node_id);
            let mut st = guard.lock().unwrap();
            st.window.record_success(latency_ms);
            st.consecutive_failures = 0;
            st.consecutive_successes += 1;
            st.backoff.delay = self.cfg.initial_backoff;
            st.last_error = None;
            let snapshot = st.window.snapshot();
            let was_initializing = st.state == HealthState::Initializing;
            let next = match st.state {
                HealthState::Initializing => HealthState::Healthy,
                HealthState::Unhealthy => HealthState::Healthy,
                HealthState::Degraded if snapshot.success_rate >= self.cfg.recovery_threshold => {
                    HealthState::Healthy
                }
                other => other,
            };
            let reason = if was_initializing {
                "first success".to_string()
            } else if st.state == HealthState::Unhealthy {
                "recovery attempt succeeded".to_string()
            } else {
                format!("success_rate={:.2}", snapshot.success_rate)
            };
            (next, reason, was_initializing)
        };
        let _ = was_initializing;
        self.transition(node_id, next, reason);
    }

    /// Records a failed outcome (probe or real request, §4.3) and runs the
    /// HEALTHY->DEGRADED/UNHEALTHY, DEGRADED->UNHEALTHY transition table.
    pub fn record_failure(&self, node_id: &NodeId, error: impl Into<String>) {
        let error = error.into();
        let (next, reason) = {
            let guard = self.entry(node_id);
            let mut st = guard.lock().unwrap();
            st.window.record_failure();
            st.consecutive_successes = 0;
            st.consecutive_failures += 1;
            st.last_error = Some(error.clone());
            // Doubling only applies to failures that happen while the circuit is
            // already open (failed recovery attempts) — the failures that first trip
            // UNHEALTHY leave the delay at its initial value (§8 scenario 2: three
            // consecutive failures from HEALTHY -> UNHEALTHY with backoff == 1s).
            if st.state == HealthState::Unhealthy {
                st.backoff.delay = (st.backoff.delay * 2).min(self.cfg.max_backoff);
            }
            st.backoff.last_failure = Some(Instant::now());
            let snapshot = st.window.snapshot();
            let next = if st.consecutive_failures >= self.cfg.max_consecutive_failures {
                HealthState::Unhealthy
            } else if st.state == HealthState::Healthy
                && snapshot.success_rate < self.cfg.unhealthy_threshold
            {
                HealthState::Degraded
            } else {
                st.state
            };
            let reason = format!(
                "failure: {} (consecutive={})",
                error, st.consecutive_failures
            );
            (next, reason)
        };
        self.transition(node_id, next, reason);
    }

    /// §4.2: true only if state == UNHEALTHY and `now - lastFailure >= backoffDelay`.
    pub fn should_attempt_recovery(&self, node_id: &NodeId) -> bool {
        let guard = self.entry(node_id);
        let st = guard.lock().unwrap();
        if st.state != HealthState::Unhealthy {
            return false;
        }
        match st.backoff.last_failure {
            None => true,
            Some(last) => last.elapsed() >= st.backoff.delay,
        }
    }

    pub fn last_error(&self, node_id: &NodeId) -> Option<String> {
        self.entry(node_id).lock().unwrap().last_error.clone()
    }

    pub fn backoff_delay(&self, node_id: &NodeId) -> Duration {
        self.entry(node_id).lock().unwrap().backoff.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEvents;

    fn tracker() -> NodeHealthTracker {
        NodeHealthTracker::new(HealthConfig::default(), Arc::new(NullEvents))
    }

    /// **Scenario**: a brand-new node starts INITIALIZING and is not eligible for routing.
    #[test]
    fn new_node_starts_initializing_and_ineligible() {
        let t = tracker();
        let n = NodeId::new("n1");
        assert_eq!(t.state(&n), HealthState::Initializing);
        assert!(!t.is_eligible(&n));
    }

    /// **Scenario**: first success transitions INITIALIZING -> HEALTHY (§4.2 table row 1).
    #[test]
    fn first_success_transitions_to_healthy() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 50);
        assert_eq!(t.state(&n), HealthState::Healthy);
        assert!(t.is_eligible(&n));
    }

    /// **Scenario** (§8 scenario 2, "Circuit opening"): three consecutive failures from
    /// HEALTHY trip UNHEALTHY, backoff starts at 1s, and recovery is not attempted
    /// immediately but is attempted once the backoff elapses.
    #[test]
    fn three_consecutive_failures_open_the_circuit() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 10);
        t.record_failure(&n, "boom");
        t.record_failure(&n, "boom");
        t.record_failure(&n, "boom");
        assert_eq!(t.state(&n), HealthState::Unhealthy);
        assert_eq!(t.backoff_delay(&n), Duration::from_secs(1));
        assert!(!t.should_attempt_recovery(&n), "backoff has not elapsed yet");
    }

    /// **Scenario**: a low (but not catastrophic) success rate degrades a HEALTHY node
    /// without tripping the circuit (§4.2 row: HEALTHY -> DEGRADED on successRate < 0.5).
    #[test]
    fn low_success_rate_degrades_without_opening_circuit() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 10);
        t.record_failure(&n, "e1");
        t.record_success(&n, 10);
        t.record_failure(&n, "e2");
        // success_rate = 2/4 = 0.5, not yet below threshold; one more failure tips it under.
        t.record_failure(&n, "e3");
        assert_eq!(t.state(&n), HealthState::Degraded);
        assert!(t.is_eligible(&n));
    }

    /// **Scenario**: a DEGRADED node recovers to HEALTHY once success rate climbs back
    /// to the recovery threshold (§4.2 row: DEGRADED -> HEALTHY on successRate >= 0.8).
    #[test]
    fn degraded_recovers_to_healthy_above_threshold() {
        let t = tracker();
        let n = NodeId::new("n1");
        // Force DEGRADED via a burst of failures, staying under the consecutive cap by
        // interleaving successes.
        t.record_success(&n, 10);
        t.record_failure(&n, "e1");
        t.record_success(&n, 10);
        t.record_failure(&n, "e2");
        t.record_failure(&n, "e3");
        assert_eq!(t.state(&n), HealthState::Degraded);
        // Window so far: 2 successes, 3 failures (rate 0.4). Need (2+S)/(5+S) >= 0.8,
        // i.e. S >= 10.
        for _ in 0..10 {
            t.record_success(&n, 10);
        }
        assert_eq!(t.state(&n), HealthState::Healthy);
    }

    /// **Scenario**: explicit markOffline transitions from any state, including HEALTHY.
    #[test]
    fn mark_offline_overrides_any_state() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 10);
        assert_eq!(t.state(&n), HealthState::Healthy);
        t.mark_offline(&n, "operator request");
        assert_eq!(t.state(&n), HealthState::Offline);
        assert!(!t.is_eligible(&n));
    }

    /// **Scenario**: should_attempt_recovery is false for HEALTHY, DEGRADED and OFFLINE nodes.
    #[test]
    fn should_attempt_recovery_false_outside_unhealthy() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 10);
        assert!(!t.should_attempt_recovery(&n)); // Healthy
        t.mark_offline(&n, "x");
        assert!(!t.should_attempt_recovery(&n)); // Offline
    }

    /// **Scenario**: a success after UNHEALTHY (a recovery attempt) resets backoff and
    /// clears the last error.
    #[test]
    fn recovery_success_resets_backoff_and_error() {
        let t = tracker();
        let n = NodeId::new("n1");
        t.record_success(&n, 10);
        t.record_failure(&n, "boom");
        t.record_failure(&n, "boom");
        t.record_failure(&n, "boom");
        assert_eq!(t.state(&n), HealthState::Unhealthy);
        assert!(t.backoff_delay(&n) > Duration::from_secs(0));
        t.record_success(&n, 20);
        assert_eq!(t.state(&n), HealthState::Healthy);
        assert_eq!(t.backoff_delay(&n), Duration::from_secs(1));
        assert!(t.last_error(&n).is_none());
    }
}

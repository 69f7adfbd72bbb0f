//! Cluster health monitor (§4.3): periodic probes of every registered node,
//! feeding outcomes into a [`NodeHealthTracker`].
//!
//! Grounded in the teacher's `ResolverRefresher::spawn()` periodic-task idiom:
//! one `tokio::spawn` loop per monitor, a `tokio::time::interval` with
//! `MissedTickBehavior::Skip` so a slow cycle never queues up a backlog, and
//! an abortable `JoinHandle` returned to the caller for shutdown.

use super::{HealthState, NodeHealthTracker};
use crate::events::{Events, HealthCheckResult};
use crate::node::Node;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of probing one node.
pub enum ProbeOutcome {
    Success { latency_ms: u64 },
    Failure { error: String },
}

/// Abstracts "how do we probe a node", so the monitor's scheduling logic is
/// testable without a real network (the teacher's `HttpClient` trait plays
/// the same role for `model_spec`'s resolvers).
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, node: &Node) -> ProbeOutcome;
}

/// Default prober: `GET {base_url}/health`, 5s timeout (§4.3), success iff
/// the response status is 2xx.
pub struct ReqwestProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for ReqwestProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Prober for ReqwestProber {
    async fn probe(&self, node: &Node) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .client
            .get(node.health_url())
            .timeout(self.timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Success {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Ok(resp) => ProbeOutcome::Failure {
                error: format!("status {}", resp.status()),
            },
            Err(e) if e.is_timeout() => ProbeOutcome::Failure {
                error: "timed out".to_string(),
            },
            Err(e) => ProbeOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// Periodic prober for a fixed set of nodes (§4.3). One probe cycle never
/// overlaps with itself: a cycle that is still running when the next tick
/// fires is skipped (`MissedTickBehavior::Skip`), mirroring the teacher's
/// `ResolverRefresher`.
pub struct ClusterHealthMonitor {
    nodes: Vec<Node>,
    tracker: Arc<NodeHealthTracker>,
    prober: Arc<dyn Prober>,
    events: Arc<dyn Events>,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ClusterHealthMonitor {
    pub fn new(
        nodes: Vec<Node>,
        tracker: Arc<NodeHealthTracker>,
        prober: Arc<dyn Prober>,
        events: Arc<dyn Events>,
        interval: Duration,
    ) -> Self {
        Self {
            nodes,
            tracker,
            prober,
            events,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the background probe loop. Idempotent: calling twice while
    /// already running is a no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let nodes = self.nodes.clone();
        let tracker = self.tracker.clone();
        let prober = self.prober.clone();
        let events = self.events.clone();
        let running = self.running.clone();
        let interval_dur = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                for node in &nodes {
                    // Nodes marked UNHEALTHY back off; only probe once the
                    // backoff window has elapsed (§4.2 should_attempt_recovery),
                    // unless the node hasn't been probed yet at all.
                    let state = tracker.state(&node.id);
                    if state == HealthState::Unhealthy && !tracker.should_attempt_recovery(&node.id) {
                        continue;
                    }
                    let outcome = prober.probe(node).await;
                    let result = match outcome {
                        ProbeOutcome::Success { latency_ms } => {
                            tracker.record_success(&node.id, latency_ms);
                            HealthCheckResult {
                                node_id: node.id.clone(),
                                success: true,
                                latency_ms: Some(latency_ms),
                                error: None,
                            }
                        }
                        ProbeOutcome::Failure { error } => {
                            tracker.record_failure(&node.id, error.clone());
                            HealthCheckResult {
                                node_id: node.id.clone(),
                                success: false,
                                latency_ms: None,
                                error: Some(error),
                            }
                        }
                    };
                    let events = events.clone();
                    crate::events::call_guarded("on_health_check", move || {
                        events.on_health_check(result)
                    });
                }
            }
        });
        self.handle = Some(handle);
    }

    /// Stops the loop. The in-flight tick (if any) is allowed to finish;
    /// no new tick starts after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ClusterHealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

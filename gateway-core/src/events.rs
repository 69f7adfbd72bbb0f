//! Central events interface (§9 design note: "Cross-component callbacks...
//! model them as one explicit `Events` interface implemented by a central
//! bus; components only know the interface.").
//!
//! The health monitor, cache warmer/synchronizer, and router all talk to
//! this trait rather than to each other directly, which keeps the module
//! graph acyclic. Handler exceptions/panics must never propagate into the
//! caller (§4.3, §6): callers use [`call_guarded`] to swallow them.

use crate::health::HealthState;
use crate::node::NodeId;

/// One health state transition (§4.2).
#[derive(Clone, Debug)]
pub struct StatusChange {
    pub node_id: NodeId,
    pub previous: HealthState,
    pub new_state: HealthState,
    pub reason: String,
}

/// One probe outcome (§4.3).
#[derive(Clone, Debug)]
pub struct HealthCheckResult {
    pub node_id: NodeId,
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// One per-node cache warmup outcome (§4.5).
#[derive(Clone, Debug)]
pub struct CacheWarmedUp {
    pub node_id: NodeId,
    pub hash: String,
    pub tokens: u32,
    pub duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct CacheWarmupFailed {
    pub node_id: NodeId,
    pub error: String,
}

/// One cache sync tick summary (§4.5).
#[derive(Clone, Debug)]
pub struct CacheSyncComplete {
    pub synced_nodes: usize,
    pub failed_nodes: usize,
    pub total_nodes: usize,
}

#[derive(Clone, Debug)]
pub struct CacheSyncError {
    pub error: String,
}

/// Caller-supplied hooks (§6): `onStatusChange`, `onHealthCheck`,
/// `onCacheWarmedUp`, `onCacheWarmupFailed`, `onCacheSyncComplete`,
/// `onCacheSyncError`. All methods have no-op default bodies so callers only
/// implement the ones they care about.
pub trait Events: Send + Sync {
    fn on_status_change(&self, _change: StatusChange) {}
    fn on_health_check(&self, _result: HealthCheckResult) {}
    fn on_cache_warmed_up(&self, _event: CacheWarmedUp) {}
    fn on_cache_warmup_failed(&self, _event: CacheWarmupFailed) {}
    fn on_cache_sync_complete(&self, _event: CacheSyncComplete) {}
    fn on_cache_sync_error(&self, _event: CacheSyncError) {}
}

/// An `Events` that drops everything. Used where no caller hooks are wired
/// (e.g. in unit tests of individual components).
#[derive(Default, Clone, Copy)]
pub struct NullEvents;

impl Events for NullEvents {}

/// Runs a callback, catching panics so a caller's broken hook can never
/// poison the monitor loop or the router (§4.3: "Callback errors never
/// propagate"). Rust has no checked exceptions, so the failure mode we guard
/// against here is a panicking handler; logs once at `warn` and moves on.
pub fn call_guarded<F: FnOnce()>(label: &str, f: F) {
    if let Err(_payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        tracing::warn!(callback = label, "event callback panicked; ignoring");
    }
}

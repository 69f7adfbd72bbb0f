//! Axum HTTP binding for gateway-core (§6 ambient binding, SPEC_FULL §6):
//! `POST /v1/messages` plus the outbound `reqwest` node dispatcher.
//!
//! **Public API**: [`app::AppState`], [`app::router`], [`build_state`].

pub mod app;
pub mod dispatch;
pub mod handlers;
pub mod upstream_sse;

use std::sync::Arc;
use std::time::Duration;

use gateway_core::cache::{warm_up_nodes, CacheClient, CacheSynchronizer, ReqwestCacheClient};
use gateway_core::health::{ClusterHealthMonitor, ReqwestProber};
use gateway_core::node::Node;
use gateway_core::{
    CacheRegistry, Events, GatewayConfig, IntentClassifier, NodeHealthTracker, NullEvents, ReqwestIntentBackend, Router,
};

use app::AppState;

/// Everything spawned alongside the request-handling `AppState`: the health
/// monitor and cache synchronizer run their own background tasks for the
/// lifetime of the process. `run_initial_warmup` is a one-shot call the
/// binary makes before starting the synchronizer (§4.5: "after initial
/// warmup, a synchronizer polls...").
pub struct GatewayHandles {
    pub state: Arc<AppState>,
    pub health_monitor: ClusterHealthMonitor,
    pub cache_synchronizer: CacheSynchronizer,
    nodes: Vec<Node>,
    cache_client: Arc<dyn CacheClient>,
    warmup_concurrency: usize,
    warmup_timeout: Duration,
    warmup_retry_count: u32,
    warmup_system_prompts: Vec<String>,
}

impl GatewayHandles {
    /// Push-warms every configured system prompt (§6 `cache.warmupSystemPrompts`)
    /// across every node (§4.5 `warmUpNodes`). A no-op if none are configured.
    pub async fn run_initial_warmup(&self) {
        for system_prompt in &self.warmup_system_prompts {
            warm_up_nodes(
                &self.nodes,
                &[system_prompt.as_str()],
                self.cache_client.as_ref(),
                &self.state.cache_registry,
                self.state.events.as_ref(),
                self.warmup_concurrency,
                self.warmup_timeout,
                self.warmup_retry_count,
            )
            .await;
        }
    }
}

/// Wires every component from a `GatewayConfig` (§6): health tracker + cluster
/// monitor (§4.2-4.3), cache registry + warmer/synchronizer (§4.4-4.5), the
/// cache-aware router (§4.6), and the intent classifier (§4.9), all talking
/// through one `Events` bus (§9).
pub fn build(config: &GatewayConfig, events: Option<Arc<dyn Events>>) -> GatewayHandles {
    let nodes = config.nodes();
    let events: Arc<dyn Events> = events.unwrap_or_else(|| Arc::new(NullEvents));

    let health = Arc::new(NodeHealthTracker::new(config.health.to_health_config(), events.clone()));
    let cache_registry = Arc::new(CacheRegistry::new(config.cache.max_cache_age_sec));

    let router = Router::new(nodes.clone(), health.clone(), cache_registry.clone(), config.routing.to_router_config());

    let prober = Arc::new(ReqwestProber::new(config.health.probe_timeout()));
    let health_monitor = ClusterHealthMonitor::new(
        nodes.clone(),
        health.clone(),
        prober,
        events.clone(),
        config.health.check_interval(),
    );

    let cache_client: Arc<dyn CacheClient> = Arc::new(ReqwestCacheClient::new(config.cache.warmup_timeout()));
    let cache_synchronizer = CacheSynchronizer::new(
        nodes.clone(),
        cache_registry.clone(),
        cache_client.clone(),
        events.clone(),
        Duration::from_millis(config.cache.sync_interval_ms),
    );

    let intent_backend = config.intent.enabled.then(|| {
        Arc::new(ReqwestIntentBackend::new(config.intent.base_url.clone(), config.intent.model.clone()))
            as Arc<dyn gateway_core::intent::IntentBackend>
    });

    let state = Arc::new(AppState {
        router,
        health,
        cache_registry,
        events,
        intent: Arc::new(IntentClassifier::new(intent_backend, config.intent.to_intent_config())),
        http_client: reqwest::Client::new(),
        node_request_timeout: AppState::node_timeout_from_config(config),
    });

    GatewayHandles {
        state,
        health_monitor,
        cache_synchronizer,
        nodes,
        cache_client,
        warmup_concurrency: config.cache.warmup_concurrency,
        warmup_timeout: config.cache.warmup_timeout(),
        warmup_retry_count: config.cache.warmup_retry_count,
        warmup_system_prompts: config.cache.warmup_system_prompts.clone(),
    }
}

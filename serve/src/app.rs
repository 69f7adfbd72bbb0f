//! Axum app: shared state and route table for the Anthropic-compatible
//! gateway surface (§6: `POST /v1/messages`), plus an ambient `/status`
//! debug endpoint exposing `Router::snapshot()` (not part of the Anthropic
//! protocol; diagnostics only).

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router as AxumRouter;
use gateway_core::{CacheRegistry, Events, GatewayConfig, IntentClassifier, NodeHealthTracker, Router};

use crate::handlers;

/// Shared state for every request. Construction (wiring health monitor, cache
/// synchronizer, router) happens once at startup in `main`; requests only
/// read from this.
pub struct AppState {
    pub router: Router,
    pub health: Arc<NodeHealthTracker>,
    pub cache_registry: Arc<CacheRegistry>,
    pub events: Arc<dyn Events>,
    pub intent: Arc<IntentClassifier>,
    pub http_client: reqwest::Client,
    pub node_request_timeout: Duration,
}

impl AppState {
    pub fn node_timeout_from_config(_config: &GatewayConfig) -> Duration {
        Duration::from_secs(60)
    }
}

pub fn router(state: Arc<AppState>) -> AxumRouter {
    AxumRouter::new()
        .route("/v1/messages", post(handlers::messages))
        .route("/status", get(handlers::status))
        .with_state(state)
}

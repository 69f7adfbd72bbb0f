//! Cache warmer / synchronizer (§4.5): pushes prompts to warm a node's KV
//! cache, then periodically pulls `/cache` state so the registry stays
//! current. Periodic-loop shape grounded in the teacher's
//! `ResolverRefresher::spawn()` (same non-overlapping-tick idiom as
//! [`crate::health::ClusterHealthMonitor`]).

use super::fingerprint::fingerprint;
use super::registry::{CacheEntry, CacheRegistry};
use crate::events::{CacheSyncComplete, CacheSyncError, CacheWarmedUp, CacheWarmupFailed, Events};
use crate::node::Node;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One node's reported cache state, as returned by `GET /cache` or
/// `POST /cache/warm` (§6): `{systemPromptHash, tokens, cached, hitRate?, lastUpdated?}`.
#[derive(Clone, Debug)]
pub struct CacheStateResponse {
    pub system_prompt_hash: String,
    pub tokens: u32,
    pub cached: bool,
    pub hit_rate: Option<f64>,
}

/// Result of one node's warmup attempt (§4.5).
#[derive(Clone, Debug)]
pub struct WarmResult {
    pub node_id: crate::node::NodeId,
    pub success: bool,
    pub hash: String,
    pub tokens: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Abstracts the node-facing cache calls so warmup/sync logic is testable
/// without a real network, mirroring the teacher's `HttpClient` trait used by
/// `model_spec`'s resolvers.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn warm(&self, node: &Node, system_prompt_hash: &str) -> Result<CacheStateResponse, String>;
    async fn fetch_state(&self, node: &Node) -> Result<CacheStateResponse, String>;
}

/// `POST /cache/warm` / `GET /cache` via reqwest, with a per-attempt timeout.
pub struct ReqwestCacheClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestCacheClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[derive(serde::Deserialize)]
struct CacheWireResponse {
    #[serde(rename = "systemPromptHash")]
    system_prompt_hash: String,
    tokens: u32,
    #[serde(default)]
    cached: bool,
    #[serde(rename = "hitRate", default)]
    hit_rate: Option<f64>,
}

impl From<CacheWireResponse> for CacheStateResponse {
    fn from(w: CacheWireResponse) -> Self {
        Self {
            system_prompt_hash: w.system_prompt_hash,
            tokens: w.tokens,
            cached: w.cached,
            hit_rate: w.hit_rate,
        }
    }
}

#[async_trait]
impl CacheClient for ReqwestCacheClient {
    async fn warm(&self, node: &Node, system_prompt_hash: &str) -> Result<CacheStateResponse, String> {
        let resp = self
            .client
            .post(node.cache_warm_url())
            .json(&serde_json::json!({ "systemPrompt": system_prompt_hash }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }
        let body: CacheWireResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(body.into())
    }

    async fn fetch_state(&self, node: &Node) -> Result<CacheStateResponse, String> {
        let resp = self
            .client
            .get(node.cache_url())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }
        let body: CacheWireResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(body.into())
    }
}

/// Warms every node with `system_prompt` (§4.5), bounded by `concurrency`
/// (default 3) in-flight warmups at a time. Each node's warmup is retried up
/// to `retry_count` times (in addition to the first attempt) within
/// `timeout` per attempt, before it's reported as a failure. Never fails the
/// overall call for a single node's error: failures are reported per-node in
/// the result list and via `onCacheWarmupFailed`.
#[allow(clippy::too_many_arguments)]
pub async fn warm_up_nodes(
    nodes: &[Node],
    system_prompt_blocks: &[impl AsRef<str> + Sync],
    client: &dyn CacheClient,
    registry: &CacheRegistry,
    events: &dyn Events,
    concurrency: usize,
    timeout: Duration,
    retry_count: u32,
) -> Vec<WarmResult> {
    let hash = fingerprint(system_prompt_blocks);
    let concurrency = concurrency.max(1);
    let mut results = Vec::with_capacity(nodes.len());
    for batch in nodes.chunks(concurrency) {
        let futures = batch
            .iter()
            .map(|node| warm_one_with_retry(node, &hash, client, timeout, retry_count));
        let batch_results = futures::future::join_all(futures).await;
        for result in batch_results {
            if result.success {
                registry.set(CacheEntry::new(
                    result.node_id.clone(),
                    batch
                        .iter()
                        .find(|n| n.id == result.node_id)
                        .map(|n| n.base_url.clone())
                        .unwrap_or_default(),
                    result.hash.clone(),
                    result.tokens,
                ));
                let ev = CacheWarmedUp {
                    node_id: result.node_id.clone(),
                    hash: result.hash.clone(),
                    tokens: result.tokens,
                    duration_ms: result.duration_ms,
                };
                crate::events::call_guarded("on_cache_warmed_up", || events.on_cache_warmed_up(ev));
            } else {
                let ev = CacheWarmupFailed {
                    node_id: result.node_id.clone(),
                    error: result.error.clone().unwrap_or_default(),
                };
                crate::events::call_guarded("on_cache_warmup_failed", || {
                    events.on_cache_warmup_failed(ev)
                });
            }
            results.push(result);
        }
    }
    results
}

/// Attempts one warmup call within `timeout`, then retries up to
/// `retry_count` additional times on failure or timeout (§4.5). The reported
/// `duration_ms` spans every attempt, so callers can see the true end-to-end
/// warmup latency including retries.
async fn warm_one_with_retry(
    node: &Node,
    hash: &str,
    client: &dyn CacheClient,
    timeout: Duration,
    retry_count: u32,
) -> WarmResult {
    let started = Instant::now();
    let mut last_error = None;
    for attempt in 0..=retry_count {
        let _ = attempt;
        match tokio::time::timeout(timeout, client.warm(node, hash)).await {
            Ok(Ok(state)) => {
                return WarmResult {
                    node_id: node.id.clone(),
                    success: true,
                    hash: state.system_prompt_hash,
                    tokens: state.tokens,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                };
            }
            Ok(Err(error)) => last_error = Some(error),
            Err(_) => last_error = Some(format!("warmup timed out after {}ms", timeout.as_millis())),
        }
    }
    WarmResult {
        node_id: node.id.clone(),
        success: false,
        hash: hash.to_string(),
        tokens: 0,
        duration_ms: started.elapsed().as_millis() as u64,
        error: last_error,
    }
}

/// Periodically polls every node's `/cache` endpoint to keep the registry
/// current (§4.5). One tick never overlaps with itself.
pub struct CacheSynchronizer {
    nodes: Vec<Node>,
    registry: Arc<CacheRegistry>,
    client: Arc<dyn CacheClient>,
    events: Arc<dyn Events>,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSynchronizer {
    pub fn new(
        nodes: Vec<Node>,
        registry: Arc<CacheRegistry>,
        client: Arc<dyn CacheClient>,
        events: Arc<dyn Events>,
        interval: Duration,
    ) -> Self {
        Self {
            nodes,
            registry,
            client,
            events,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let nodes = self.nodes.clone();
        let registry = self.registry.clone();
        let client = self.client.clone();
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
                run_one_sync_tick(&nodes, &registry, client.as_ref(), events.as_ref()).await;
            }
        });
        self.handle = Some(handle);
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for CacheSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_one_sync_tick(
    nodes: &[Node],
    registry: &CacheRegistry,
    client: &dyn CacheClient,
    events: &dyn Events,
) {
    registry.expire_stale_entries();
    let mut synced = 0usize;
    let mut failed = 0usize;
    for node in nodes {
        match client.fetch_state(node).await {
            Ok(state) => {
                registry.set(CacheEntry {
                    node_id: node.id.clone(),
                    node_url: node.base_url.clone(),
                    system_prompt_hash: state.system_prompt_hash,
                    tokens: state.tokens,
                    last_updated: super::registry::now_ms(),
                    hit_rate: state.hit_rate.unwrap_or(0.0),
                });
                synced += 1;
            }
            Err(error) => {
                failed += 1;
                let ev = CacheSyncError { error };
                crate::events::call_guarded("on_cache_sync_error", || events.on_cache_sync_error(ev));
            }
        }
    }
    let ev = CacheSyncComplete {
        synced_nodes: synced,
        failed_nodes: failed,
        total_nodes: nodes.len(),
    };
    crate::events::call_guarded("on_cache_sync_complete", || events.on_cache_sync_complete(ev));
}

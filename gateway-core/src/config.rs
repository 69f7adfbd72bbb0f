//! `GatewayConfig` (§6): the one config object the core owns — cluster
//! topology plus per-subsystem tuning knobs. Loading this from a file path,
//! CLI flags, or environment variables is `serve`'s job; this module only
//! owns the typed shape and its defaults, matching the §6 sub-sections
//! (`discovery`, `health`, `cache`, `routing`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::registry::DEFAULT_MAX_CACHE_AGE_SEC;
use crate::health::HealthConfig;
use crate::router::{RouterConfig, RoutingStrategy};

/// `discovery: {mode:"static", nodes:[...]}` (§6). Only the `static` mode is
/// modeled; a dynamic discovery backend is an external collaborator that
/// produces this same shape before startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_mode")]
    pub mode: String,
    pub nodes: Vec<NodeConfig>,
}

fn default_discovery_mode() -> String {
    "static".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub base_url: String,
}

/// `health: {checkIntervalMs, timeoutMs, maxConsecutiveFailures, unhealthyThreshold}` (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub check_interval_ms: u64,
    pub timeout_ms: u64,
    pub max_consecutive_failures: u32,
    pub unhealthy_threshold: f64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            check_interval_ms: 10_000,
            timeout_ms: 5_000,
            max_consecutive_failures: 3,
            unhealthy_threshold: 0.5,
        }
    }
}

impl HealthSection {
    pub fn to_health_config(self) -> HealthConfig {
        HealthConfig {
            max_consecutive_failures: self.max_consecutive_failures,
            unhealthy_threshold: self.unhealthy_threshold,
            ..HealthConfig::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// `cache: {maxCacheAgeSec, minCacheHitRate, maxCacheSizeTokens}` (§6).
/// `min_cache_hit_rate` and `max_cache_size_tokens` are advisory (§3 `CacheEntry.hitRate`
/// supplement) and never gate routing on their own.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_cache_age_sec: u64,
    pub min_cache_hit_rate: f64,
    pub max_cache_size_tokens: u32,
    pub sync_interval_ms: u64,
    pub warmup_concurrency: usize,
    pub warmup_timeout_ms: u64,
    pub warmup_retry_count: u32,
    /// System prompts to push-warm across every node at startup (§4.5
    /// `warmUpNodes`), before the periodic synchronizer takes over. Empty by
    /// default: a gateway with no commonly-reused system prompt configured
    /// just relies on pull-sync to discover what's already cached.
    pub warmup_system_prompts: Vec<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_cache_age_sec: DEFAULT_MAX_CACHE_AGE_SEC,
            min_cache_hit_rate: 0.0,
            max_cache_size_tokens: u32::MAX,
            sync_interval_ms: 30_000,
            warmup_concurrency: 3,
            warmup_timeout_ms: 5_000,
            warmup_retry_count: 2,
            warmup_system_prompts: Vec::new(),
        }
    }
}

impl CacheSection {
    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_millis(self.warmup_timeout_ms)
    }
}

/// `intent: {enabled, baseUrl, model, timeoutMs}` (§6 ambient classifier
/// backend; §4.9). Disabled by default — a gateway with no designated
/// classifier model still runs the cache+regex stages of the cascade.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentSection {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    pub cache_capacity: usize,
    pub cache_ttl_sec: u64,
}

impl Default for IntentSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 1_000,
            cache_capacity: 100,
            cache_ttl_sec: 300,
        }
    }
}

impl IntentSection {
    pub fn to_intent_config(&self) -> crate::intent::IntentConfig {
        crate::intent::IntentConfig {
            cache_capacity: self.cache_capacity,
            cache_ttl: Duration::from_secs(self.cache_ttl_sec),
            llm_timeout: Duration::from_millis(self.timeout_ms),
            fallback_enabled: true,
        }
    }
}

/// `routing: {strategy, maxRetries, retryDelayMs}` (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub strategy: RoutingStrategyConfig,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategyConfig::CacheAware,
            max_retries: 1,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategyConfig {
    CacheAware,
    LeastLoaded,
    RoundRobin,
}

impl From<RoutingStrategyConfig> for RoutingStrategy {
    fn from(v: RoutingStrategyConfig) -> Self {
        match v {
            RoutingStrategyConfig::CacheAware => RoutingStrategy::CacheAware,
            RoutingStrategyConfig::LeastLoaded => RoutingStrategy::LeastLoaded,
            RoutingStrategyConfig::RoundRobin => RoutingStrategy::RoundRobin,
        }
    }
}

impl RoutingSection {
    pub fn to_router_config(self) -> RouterConfig {
        RouterConfig {
            strategy: self.strategy.into(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Top-level cluster config (§6), loadable from TOML at startup only; never
/// mutated in place afterward (§3 Node lifecycle).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub discovery: DiscoveryConfig,
    pub health: HealthSection,
    pub cache: CacheSection,
    pub routing: RoutingSection,
    pub intent: IntentSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig {
                mode: default_discovery_mode(),
                nodes: Vec::new(),
            },
            health: HealthSection::default(),
            cache: CacheSection::default(),
            routing: RoutingSection::default(),
            intent: IntentSection::default(),
        }
    }
}

impl GatewayConfig {
    /// Parses a `GatewayConfig` from TOML text (§6 shape).
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn nodes(&self) -> Vec<crate::node::Node> {
        self.discovery
            .nodes
            .iter()
            .map(|n| crate::node::Node::new(n.id.clone(), n.base_url.clone()))
            .collect()
    }
}

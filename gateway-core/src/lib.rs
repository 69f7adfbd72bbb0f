//! # gateway-core
//!
//! Core library for an Anthropic-Messages-API-compatible gateway fronting a
//! cluster of OpenAI-compatible inference nodes: cache-aware routing, node
//! health monitoring, KV-cache registry/warmup, and bidirectional streaming
//! protocol translation.
//!
//! ## Main modules
//!
//! - [`node`]: [`Node`], [`NodeId`] — cluster node identity.
//! - [`metrics`]: [`RollingWindow`], [`WindowSnapshot`] — time-windowed success/latency stats.
//! - [`health`]: [`HealthState`], [`NodeHealthTracker`], [`ClusterHealthMonitor`] — per-node
//!   state machine and periodic probing.
//! - [`events`]: [`Events`] — the callback interface all components talk to, keeping the
//!   module graph acyclic.
//! - [`error`]: [`GatewayError`] and the per-subsystem error enums, plus the Anthropic
//!   error-type/HTTP-status mapping.
//!
//! Key types are re-exported at crate root.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod intent;
pub mod json_stream;
pub mod metrics;
pub mod node;
pub mod protocol;
pub mod router;

pub use cache::{CacheEntry, CacheRegistry, CacheSynchronizer};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use events::{Events, NullEvents};
pub use health::{ClusterHealthMonitor, HealthConfig, HealthState, NodeHealthTracker};
pub use intent::{IntentClassifier, IntentConfig, ReqwestIntentBackend};
pub use json_stream::{FeedResult, JsonValue, StreamingJsonParser, ToolInfo};
pub use metrics::{RollingWindow, WindowSnapshot, DEFAULT_WINDOW};
pub use node::{Node, NodeId};
pub use protocol::StreamTranslator;
pub use router::{NodeDispatcher, Router, RouterConfig, RoutingStrategy};

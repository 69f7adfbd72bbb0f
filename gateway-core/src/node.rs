//! Node identity (§3): immutable, registered at startup, never mutated in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque node identifier. A newtype so it cannot be confused with a session
/// key, a cache hash, or any other bare `String` floating through the router.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One upstream OpenAI-compatible inference node (§3). Identity is immutable;
/// lifecycle is "registered at startup from discovery config, never mutated
/// in place" — callers that need to change a node's address register a new
/// `Node` under the same id at the call sites that own the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub base_url: String,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
        }
    }

    /// `{base_url}/v1/chat/completions`, with base trimmed of a trailing slash.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }

    pub fn cache_url(&self) -> String {
        format!("{}/cache", self.base_url.trim_end_matches('/'))
    }

    pub fn cache_warm_url(&self) -> String {
        format!("{}/cache/warm", self.base_url.trim_end_matches('/'))
    }

    pub fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url.trim_end_matches('/'))
    }
}

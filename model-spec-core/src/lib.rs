//! Shared model-discovery types for the gateway (§6): advisory metadata read
//! from each cluster node's `GET /v1/models`, grounded in the teacher's
//! `model_spec` crate (`ModelSpec`, `ModelLimitResolver`).
//!
//! Discovery is advisory only (§6): routing must never fail solely because a
//! node's `/v1/models` call failed or omitted a field.

use serde::{Deserialize, Serialize};

/// One model entry as reported by a node's `/v1/models` endpoint.
///
/// Context-length fields are read in priority order per §6:
/// `loaded_context_length` (what the node actually loaded) overrides
/// `max_context_length` (the model's architectural ceiling) overrides
/// `context_length` (a generic fallback some servers report instead).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeModelInfo {
    pub id: String,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub max_context_length: Option<u32>,
    #[serde(default)]
    pub loaded_context_length: Option<u32>,
}

impl NodeModelInfo {
    /// Effective context length per the §6 priority order, or `None` if the
    /// node reported none of the three fields.
    pub fn effective_context_length(&self) -> Option<u32> {
        self.loaded_context_length
            .or(self.max_context_length)
            .or(self.context_length)
    }
}

/// Response body shape of `GET /v1/models` (OpenAI-compatible: `{"data": [...]}`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<NodeModelInfo>,
}

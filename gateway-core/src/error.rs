//! Error taxonomy for the gateway (§7).
//!
//! Each subsystem has its own `thiserror` enum; `GatewayError` unifies them at
//! the HTTP boundary, where `serve` maps it onto an Anthropic error event or
//! a JSON error body.

use thiserror::Error;

/// Health monitor / tracker errors (§7: HealthCheckTimeout, HealthCheckFailed, HealthCheckNetworkError).
#[derive(Debug, Error, Clone)]
pub enum HealthError {
    #[error("health check to {node_id} timed out")]
    Timeout { node_id: String },

    #[error("health check to {node_id} failed with status {status}")]
    BadStatus { node_id: String, status: u16 },

    #[error("health check to {node_id} failed: {cause}")]
    Network { node_id: String, cause: String },
}

/// Cache registry / warmer errors (§7: CacheWarmupFailed, CacheSyncError).
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("cache warmup failed for {node_id}: {cause}")]
    WarmupFailed { node_id: String, cause: String },

    #[error("cache sync failed for {node_id}: {cause}")]
    SyncFailed { node_id: String, cause: String },
}

/// Router / dispatch errors (§7: NodeOffline, NodeDispatchPreCommit, NodeDispatchMidStream).
#[derive(Debug, Error, Clone)]
pub enum RouterError {
    #[error("no eligible node for this request")]
    NoEligibleNode,

    #[error("all {attempts} dispatch attempt(s) failed: {causes:?}")]
    AllAttemptsFailed {
        attempts: usize,
        causes: Vec<String>,
    },

    #[error("node {node_id} failed before first byte: {cause}")]
    PreCommit { node_id: String, cause: String },

    #[error("node {node_id} failed mid-stream: {cause}")]
    MidStream { node_id: String, cause: String },
}

/// Streaming JSON parser errors (§7: ParserBufferOverflow, ParserNestingExceeded, ParserTimeout).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("buffer cap of {limit} bytes exceeded")]
    BufferOverflow { limit: usize },

    #[error("nesting cap of {limit} levels exceeded")]
    NestingExceeded { limit: usize },

    #[error("parser exceeded wall-clock cap of {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("malformed JSON at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

/// Protocol translation errors (§7: ProtocolTranslationError).
#[derive(Debug, Error, Clone)]
pub enum TranslateError {
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("streaming JSON parser failed: {0}")]
    Parser(#[from] ParserError),

    #[error("unknown finish reason: {0}")]
    UnknownFinishReason(String),
}

/// Top-level error surfaced at the HTTP boundary.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Translate(#[from] TranslateError),
}

impl GatewayError {
    /// Anthropic `error.type` string (stable taxonomy, §7).
    pub fn anthropic_type(&self) -> &'static str {
        match self {
            GatewayError::Router(RouterError::NoEligibleNode)
            | GatewayError::Router(RouterError::AllAttemptsFailed { .. }) => "overloaded_error",
            GatewayError::Translate(_) | GatewayError::Parser(_) => "api_error",
            GatewayError::Health(_) | GatewayError::Cache(_) => "api_error",
            GatewayError::Router(_) => "api_error",
        }
    }

    /// HTTP status for the non-streaming response path.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Router(RouterError::NoEligibleNode)
            | GatewayError::Router(RouterError::AllAttemptsFailed { .. }) => 503,
            GatewayError::Translate(_) => 502,
            _ => 500,
        }
    }
}

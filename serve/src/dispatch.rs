//! The one concrete [`NodeDispatcher`] (§4.6): issues the translated OpenAI
//! request against a node over `reqwest` and classifies the outcome as
//! pre-commit (retryable) or committed (first byte delivered, no more
//! retries). The router only ever sees [`AttemptOutcome`]; the actual
//! response body is handed back to the caller out-of-band through
//! [`HttpDispatcher::take_outcome`] once `Router::dispatch` resolves, since
//! the committed body belongs to whichever attempt won, not to the router.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gateway_core::error::RouterError;
use gateway_core::protocol::openai::ChatCompletionRequest;
use gateway_core::router::{AttemptOutcome, NodeDispatcher};
use gateway_core::Node;
use tokio_util::sync::CancellationToken;

/// What a committed attempt leaves behind for the caller to consume after
/// `Router::dispatch` resolves (§4.6: "partial output is already delivered
/// downstream" once committed — the router itself never sees response bytes).
pub enum CommittedResponse {
    Streaming(reqwest::Response),
    NonStreaming(reqwest::Response),
}

/// Dispatches one Anthropic request's translated OpenAI form to whichever
/// node the router selects. One instance is scoped to a single inbound
/// request; `take_outcome` is called exactly once, after `dispatch` returns.
pub struct HttpDispatcher {
    client: reqwest::Client,
    request: ChatCompletionRequest,
    session_id: Option<String>,
    timeout: Duration,
    outcome: Mutex<Option<CommittedResponse>>,
}

impl HttpDispatcher {
    pub fn new(
        client: reqwest::Client,
        request: ChatCompletionRequest,
        session_id: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            request,
            session_id,
            timeout,
            outcome: Mutex::new(None),
        }
    }

    /// Takes the committed response body, if `dispatch` resolved `Ok`. Only
    /// meaningful after a successful `Router::dispatch` call on this instance.
    pub fn take_outcome(&self) -> Option<CommittedResponse> {
        self.outcome.lock().unwrap().take()
    }
}

/// `X-Cache-Hit: 1|0` response header hint (§6) telling the router to mark
/// the cache registry entry fresh without waiting for the next sync tick.
fn cache_hit_header(resp: &reqwest::Response) -> Option<bool> {
    resp.headers()
        .get("X-Cache-Hit")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "1")
}

#[async_trait]
impl NodeDispatcher for HttpDispatcher {
    async fn attempt(&self, node: &Node, cancel: CancellationToken) -> AttemptOutcome {
        let started = Instant::now();
        let mut req = self
            .client
            .post(node.chat_completions_url())
            .json(&self.request)
            .timeout(self.timeout);
        if let Some(session_id) = &self.session_id {
            req = req.header("X-Session-Id", session_id.clone());
        }

        let sent = tokio::select! {
            result = req.send() => result,
            _ = cancel.cancelled() => {
                return AttemptOutcome::PreCommitFailure {
                    error: "cancelled before dispatch".to_string(),
                };
            }
        };

        let resp = match sent {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                return AttemptOutcome::PreCommitFailure {
                    error: format!("status {}", resp.status()),
                }
            }
            Err(e) => {
                return AttemptOutcome::PreCommitFailure {
                    error: e.to_string(),
                }
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let cache_hit = cache_hit_header(&resp);
        let committed = if self.request.stream {
            CommittedResponse::Streaming(resp)
        } else {
            CommittedResponse::NonStreaming(resp)
        };
        *self.outcome.lock().unwrap() = Some(committed);
        AttemptOutcome::Committed { latency_ms, cache_hit }
    }
}

/// Maps a router failure to the Anthropic-facing error taxonomy (§7: `NodeOffline`
/// when no candidate existed at all, `NodeDispatchPreCommit` when every
/// candidate failed before committing).
pub fn router_error_to_gateway(err: RouterError) -> gateway_core::GatewayError {
    gateway_core::GatewayError::Router(err)
}

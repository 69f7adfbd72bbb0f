//! HTTP handlers for the Anthropic-compatible surface (§6).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use gateway_core::cache::fingerprint;
use gateway_core::protocol::anthropic::{ErrorBody, MessagesRequest, StreamEvent};
use gateway_core::protocol::{anthropic_to_openai_request, openai_to_anthropic_response};
use gateway_core::protocol::openai::ChatCompletionResponse;
use gateway_core::{GatewayError, StreamTranslator};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::app::AppState;
use crate::dispatch::{CommittedResponse, HttpDispatcher};
use crate::upstream_sse::chunks_from_sse;

/// Renders a `GatewayError` as the Anthropic non-streaming error body (§7).
fn gateway_error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "type": "error",
        "error": { "type": err.anthropic_type(), "message": err.to_string() },
    });
    (status, Json(body)).into_response()
}

fn invalid_request(message: impl Into<String>) -> Response {
    let body = serde_json::json!({
        "type": "error",
        "error": { "type": "invalid_request_error", "message": message.into() },
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// `GET /status`: ambient diagnostics (not part of the Anthropic protocol),
/// exposing `Router::snapshot()` per-node state without mutating anything.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.snapshot())
}

/// `POST /v1/messages` (§6): decode the Anthropic request, select a node, and
/// either stream back an Anthropic SSE event sequence or return one JSON
/// `Message`.
pub async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return invalid_request(format!("invalid request body: {e}")),
    };

    let session_id = headers
        .get("X-Session-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // §4.9: classify the latest user turn's intent so the translator can expose
    // a web-search tool, before the request is translated and dispatched.
    let last_user_text = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.visible_text())
        .unwrap_or_default();
    let wants_search = state.intent.classify(&last_user_text).await;

    let mut openai_req = anthropic_to_openai_request(&req, None);
    if wants_search {
        maybe_add_web_search_tool(&mut openai_req);
    }

    let hash = fingerprint(&req.system.as_ref().map(|s| s.blocks()).unwrap_or_default());
    let cancel = CancellationToken::new();
    let dispatcher = HttpDispatcher::new(
        state.http_client.clone(),
        openai_req,
        session_id.clone(),
        state.node_request_timeout,
    );

    let result = state
        .router
        .dispatch(&hash, session_id.as_deref(), &dispatcher, cancel.clone())
        .await;

    let node_id = match result {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "dispatch exhausted every candidate");
            return gateway_error_response(&GatewayError::Router(e));
        }
    };

    match dispatcher.take_outcome() {
        Some(CommittedResponse::NonStreaming(resp)) => non_streaming_response(resp, req.model).await,
        Some(CommittedResponse::Streaming(resp)) => streaming_response(resp, req.model, node_id, cancel),
        None => {
            error!(node = %node_id, "dispatch committed but left no response body");
            gateway_error_response(&GatewayError::Translate(
                gateway_core::error::TranslateError::MalformedResponse("no response body captured".into()),
            ))
        }
    }
}

/// Adds a `web_search` tool definition if the translated request doesn't
/// already carry one (§4.9: the classifier is advisory, never overriding a
/// caller-supplied tool list).
fn maybe_add_web_search_tool(req: &mut gateway_core::protocol::openai::ChatCompletionRequest) {
    let already_present = req
        .tools
        .as_ref()
        .is_some_and(|tools| tools.iter().any(|t| t.function.name == "web_search"));
    if already_present {
        return;
    }
    let tool = gateway_core::protocol::openai::ToolSpec {
        spec_type: "function",
        function: gateway_core::protocol::openai::FunctionSpec {
            name: "web_search".to_string(),
            description: Some("Search the web for current or external information.".to_string()),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
                "additionalProperties": false,
            }),
        },
    };
    req.tools.get_or_insert_with(Vec::new).push(tool);
}

async fn non_streaming_response(resp: reqwest::Response, model: String) -> Response {
    let body: ChatCompletionResponse = match resp.json().await {
        Ok(b) => b,
        Err(e) => {
            return gateway_error_response(&GatewayError::Translate(
                gateway_core::error::TranslateError::MalformedResponse(e.to_string()),
            ))
        }
    };
    let message_id = format!("msg_{}", uuid::Uuid::new_v4());
    match openai_to_anthropic_response(&body, message_id, model) {
        Ok(message) => Json(message).into_response(),
        Err(e) => gateway_error_response(&GatewayError::Translate(e)),
    }
}

/// Streams the node's chunk sequence through a [`StreamTranslator`], emitting
/// Anthropic SSE frames as they're produced (§4.8). A parse/translate failure
/// mid-stream terminates the response with one `error` event (§7) rather than
/// failing the whole request, since earlier events are already delivered.
fn streaming_response(
    resp: reqwest::Response,
    model: String,
    node_id: gateway_core::node::NodeId,
    cancel: CancellationToken,
) -> Response {
    let (tx, rx) = mpsc::channel::<String>(32);
    let message_id = format!("msg_{}", uuid::Uuid::new_v4());

    tokio::spawn(async move {
        let mut translator = StreamTranslator::new(message_id, model);
        if tx.send(translator.start().to_sse()).await.is_err() {
            cancel.cancel();
            return;
        }

        let mut chunks = chunks_from_sse(resp.bytes_stream());
        loop {
            let next = tokio::select! {
                item = chunks.next() => item,
                _ = cancel.cancelled() => break,
            };
            let Some(item) = next else { break };
            match item {
                Ok(chunk) => match translator.feed(&chunk) {
                    Ok(events) => {
                        for ev in events {
                            if tx.send(ev.to_sse()).await.is_err() {
                                cancel.cancel();
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let mid_stream = GatewayError::Router(gateway_core::error::RouterError::MidStream {
                            node_id: node_id.to_string(),
                            cause: e.to_string(),
                        });
                        let _ = tx
                            .send(
                                StreamEvent::Error {
                                    error: ErrorBody {
                                        error_type: mid_stream.anthropic_type(),
                                        message: mid_stream.to_string(),
                                    },
                                }
                                .to_sse(),
                            )
                            .await;
                        return;
                    }
                },
                Err(e) => {
                    let mid_stream = GatewayError::Router(gateway_core::error::RouterError::MidStream {
                        node_id: node_id.to_string(),
                        cause: e,
                    });
                    let _ = tx
                        .send(
                            StreamEvent::Error {
                                error: ErrorBody {
                                    error_type: mid_stream.anthropic_type(),
                                    message: mid_stream.to_string(),
                                },
                            }
                            .to_sse(),
                        )
                        .await;
                    return;
                }
            }
        }

        for ev in translator.finish() {
            if tx.send(ev.to_sse()).await.is_err() {
                return;
            }
        }
    });

    let body_stream = ReceiverStream::new(rx).map(|frame| Ok::<_, std::io::Error>(frame.into_bytes()));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

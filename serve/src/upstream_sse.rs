//! Reads a node's `chat.completion.chunk` SSE body (§6) into parsed chunks.
//! No `StreamTranslator` state lives here; this module only turns raw bytes
//! into `data: <json>` payloads, terminated by the `[DONE]` sentinel.

use futures::{Stream, StreamExt};
use gateway_core::protocol::openai::ChatCompletionChunk;

/// Splits a byte stream on blank-line-delimited SSE frames and yields the
/// JSON payload of each `data:` line, skipping the `[DONE]` terminator.
/// Malformed JSON in one frame surfaces as `Err` so the caller can terminate
/// the Anthropic stream with an `error` event (§7 `ProtocolTranslationError`).
pub fn chunks_from_sse(
    body: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin + Send + 'static,
) -> impl Stream<Item = Result<ChatCompletionChunk, String>> + Send {
    let mut buf = String::new();
    body.map(|res| res.map_err(|e| e.to_string())).flat_map(move |chunk| {
        let mut out = Vec::new();
        match chunk {
            Ok(bytes) => {
                buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buf.find("\n\n") {
                    let frame: String = buf.drain(..pos + 2).collect();
                    for line in frame.lines() {
                        let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                            continue;
                        };
                        let data = data.trim();
                        if data == "[DONE]" || data.is_empty() {
                            continue;
                        }
                        out.push(
                            serde_json::from_str::<ChatCompletionChunk>(data)
                                .map_err(|e| format!("malformed upstream chunk: {e}")),
                        );
                    }
                }
            }
            Err(e) => out.push(Err(e)),
        }
        futures::stream::iter(out)
    })
}

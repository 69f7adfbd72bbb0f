//! OpenAI chunk stream -> Anthropic event stream state machine (§4.8).
//!
//! Single-threaded, per-request: one [`StreamTranslator`] owns no state shared
//! across requests. Feed it OpenAI `ChatCompletionChunk`s in arrival order;
//! it emits Anthropic [`StreamEvent`]s in the ordering the Messages API
//! contract requires.

use std::collections::HashMap;

use super::anthropic::{self, ContentBlock, Delta, MessageDeltaBody, MessagesResponse, StreamEvent, Usage};
use super::openai::ChatCompletionChunk;
use crate::error::TranslateError;
use crate::json_stream::StreamingJsonParser;

enum OpenBlock {
    Text,
    Tool(String),
}

struct ToolBlockState {
    index: u32,
    name: String,
    parser: StreamingJsonParser,
    received_any_delta: bool,
}

/// Drives one Anthropic SSE stream from a sequence of OpenAI stream chunks.
pub struct StreamTranslator {
    message_id: String,
    model: String,
    next_index: u32,
    text_index: Option<u32>,
    tool_states: HashMap<String, ToolBlockState>,
    index_to_key: HashMap<u32, String>,
    open_order: Vec<OpenBlock>,
    usage: Usage,
    stop_reason: Option<&'static str>,
}

impl StreamTranslator {
    pub fn new(message_id: String, model: String) -> Self {
        Self {
            message_id,
            model,
            next_index: 0,
            text_index: None,
            tool_states: HashMap::new(),
            index_to_key: HashMap::new(),
            open_order: Vec::new(),
            usage: Usage::default(),
            stop_reason: None,
        }
    }

    /// The opening `message_start` event; the usage block is best-effort
    /// (zero) since most providers report it only on the final chunk.
    pub fn start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.message_id.clone(),
                response_type: "message",
                role: "assistant",
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        }
    }

    fn alloc_index(&mut self) -> u32 {
        let i = self.next_index;
        self.next_index += 1;
        i
    }

    fn ensure_text_open(&mut self, events: &mut Vec<StreamEvent>) -> u32 {
        if let Some(i) = self.text_index {
            return i;
        }
        let index = self.alloc_index();
        self.text_index = Some(index);
        self.open_order.push(OpenBlock::Text);
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::Text { text: String::new() },
        });
        index
    }

    fn close_text_if_open(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(index) = self.text_index.take() {
            events.push(StreamEvent::ContentBlockStop { index });
            self.open_order.retain(|b| !matches!(b, OpenBlock::Text));
        }
    }

    /// Feeds one OpenAI stream chunk, returning the Anthropic events it
    /// produces. Returns a fatal [`TranslateError`] if a tool call's
    /// argument fragments fail the streaming JSON parser's safety caps.
    pub fn feed(&mut self, chunk: &ChatCompletionChunk) -> Result<Vec<StreamEvent>, TranslateError> {
        let mut events = Vec::new();

        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content {
                if !text.is_empty() {
                    let index = self.ensure_text_open(&mut events);
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::TextDelta { text: text.clone() },
                    });
                }
            }

            if let Some(tool_calls) = &choice.delta.tool_calls {
                for tc in tool_calls {
                    let key = if let Some(id) = &tc.id {
                        self.index_to_key.entry(tc.index).or_insert_with(|| id.clone()).clone()
                    } else {
                        self.index_to_key
                            .get(&tc.index)
                            .cloned()
                            .unwrap_or_else(|| format!("tool-{}", tc.index))
                    };

                    if !self.tool_states.contains_key(&key) {
                        self.close_text_if_open(&mut events);
                        let name = tc
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();
                        let index = self.alloc_index();
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlock::ToolUse {
                                id: key.clone(),
                                name: name.clone(),
                                input: serde_json::json!({}),
                            },
                        });
                        self.open_order.push(OpenBlock::Tool(key.clone()));
                        self.tool_states.insert(
                            key.clone(),
                            ToolBlockState {
                                index,
                                name,
                                parser: StreamingJsonParser::new(),
                                received_any_delta: false,
                            },
                        );
                    }

                    if let Some(func) = &tc.function {
                        if let Some(args) = &func.arguments {
                            if !args.is_empty() {
                                let state = self.tool_states.get_mut(&key).expect("just inserted above");
                                let feed_result = state.parser.feed(args).map_err(TranslateError::Parser)?;
                                state.received_any_delta = true;
                                if !feed_result.delta.is_empty() {
                                    events.push(StreamEvent::ContentBlockDelta {
                                        index: state.index,
                                        delta: Delta::InputJsonDelta {
                                            partial_json: feed_result.delta,
                                        },
                                    });
                                }
                            }
                        }
                    }
                }
            }

            if let Some(reason) = &choice.finish_reason {
                self.stop_reason = Some(anthropic::map_stop_reason(reason));
            }
        }

        if let Some(u) = chunk.usage {
            self.usage = Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            };
        }

        Ok(events)
    }

    /// Closes every open block in reverse order, then emits `message_delta`
    /// and `message_stop` (§4.8).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let pending_synthetic: Vec<(u32, String)> = self
            .tool_states
            .values()
            .filter(|s| !s.received_any_delta)
            .map(|s| (s.index, s.name.clone()))
            .collect();
        for (index, _name) in pending_synthetic {
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::InputJsonDelta {
                    partial_json: "{}".to_string(),
                },
            });
        }

        for block in self.open_order.drain(..).rev() {
            let index = match block {
                OpenBlock::Text => self.text_index.take().expect("text block recorded as open"),
                OpenBlock::Tool(key) => self.tool_states.get(&key).expect("tool block recorded as open").index,
            };
            events.push(StreamEvent::ContentBlockStop { index });
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: self.stop_reason,
                stop_sequence: None,
            },
            usage: self.usage,
        });
        events.push(StreamEvent::MessageStop);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai::{ChunkChoice, Delta as OaiDelta, DeltaFunctionCall, DeltaToolCall, UsageInfo};

    fn chunk_with_text(text: &str) -> ChatCompletionChunk {
        ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: Some(text.to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// **Scenario**: plain text deltas open one text block and stream deltas into it.
    #[test]
    fn text_only_stream_opens_one_block_and_closes_on_finish() {
        let mut t = StreamTranslator::new("msg_1".into(), "claude-3".into());
        let mut events = vec![t.start()];
        events.extend(t.feed(&chunk_with_text("Hello")).unwrap());
        events.extend(t.feed(&chunk_with_text(", world")).unwrap());
        events.extend(t.finish());

        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(events[2], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[3], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[4], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[5], StreamEvent::MessageDelta { .. }));
        assert!(matches!(events[6], StreamEvent::MessageStop));
    }

    /// **Scenario** (§8 scenario 3): a tool call streams its name then argument
    /// fragments across several chunks; deltas concatenate to the full JSON and the
    /// text block (if any was open) closes before the tool block opens.
    #[test]
    fn tool_call_streams_argument_deltas_and_closes_preceding_text_block() {
        let mut t = StreamTranslator::new("msg_1".into(), "claude-3".into());
        let mut events = vec![t.start()];
        events.extend(t.feed(&chunk_with_text("Let me check that.")).unwrap());

        let start_chunk = ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: None,
                    tool_calls: Some(vec![DeltaToolCall {
                        index: 0,
                        id: Some("call_1".into()),
                        function: Some(DeltaFunctionCall {
                            name: Some("get_weather".into()),
                            arguments: Some(r#"{"city":"#.to_string()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        events.extend(t.feed(&start_chunk).unwrap());

        let continue_chunk = ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: None,
                    tool_calls: Some(vec![DeltaToolCall {
                        index: 0,
                        id: None,
                        function: Some(DeltaFunctionCall {
                            name: None,
                            arguments: Some(r#""NYC"}"#.to_string()),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: Some(UsageInfo {
                prompt_tokens: 20,
                completion_tokens: 10,
            }),
        };
        events.extend(t.feed(&continue_chunk).unwrap());
        events.extend(t.finish());

        // text block (index 0) opens, gets one delta, then closes before the tool
        // block (index 1) opens.
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(events[2], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[3], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(
            events[4],
            StreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::ToolUse { .. }
            }
        ));

        let deltas: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockDelta {
                    index: 1,
                    delta: Delta::InputJsonDelta { partial_json },
                } => Some(partial_json.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.join(""), r#"{"city":"NYC"}"#);

        let stop_reason_event = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::MessageDelta { delta, .. } => delta.stop_reason,
                _ => None,
            })
            .unwrap();
        assert_eq!(stop_reason_event, "tool_use");
    }

    /// **Scenario**: a tool call id is seen only on the first of several chunks;
    /// subsequent deltas carry no id and are matched purely by index, and the id is
    /// never re-emitted as a second `content_block_start`.
    #[test]
    fn repeated_tool_call_starts_for_same_id_are_coalesced() {
        let mut t = StreamTranslator::new("msg_1".into(), "claude-3".into());
        let _ = t.start();
        let make = |id: Option<&str>, args: &str| ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: None,
                    tool_calls: Some(vec![DeltaToolCall {
                        index: 0,
                        id: id.map(|s| s.to_string()),
                        function: Some(DeltaFunctionCall {
                            name: id.map(|_| "noop".to_string()),
                            arguments: Some(args.to_string()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let e1 = t.feed(&make(Some("call_1"), "{}")).unwrap();
        let e2 = t.feed(&make(None, "")).unwrap();
        let starts = e1
            .iter()
            .chain(e2.iter())
            .filter(|e| matches!(e, StreamEvent::ContentBlockStart { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    /// **Scenario**: a tool call with no argument deltas at all gets a synthetic
    /// `{}` delta at finish time.
    #[test]
    fn tool_call_with_no_argument_deltas_gets_synthetic_empty_object() {
        let mut t = StreamTranslator::new("msg_1".into(), "claude-3".into());
        let _ = t.start();
        let start_only = ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: None,
                    tool_calls: Some(vec![DeltaToolCall {
                        index: 0,
                        id: Some("call_1".into()),
                        function: Some(DeltaFunctionCall {
                            name: Some("ping".into()),
                            arguments: None,
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let mut events = t.feed(&start_only).unwrap();
        events.extend(t.finish());
        let synthetic = events.iter().any(|e| {
            matches!(
                e,
                StreamEvent::ContentBlockDelta {
                    delta: Delta::InputJsonDelta { partial_json },
                    ..
                } if partial_json == "{}"
            )
        });
        assert!(synthetic, "expected a synthetic {{}} delta for the argument-less tool call");
    }

    /// **Scenario** (§8 scenario 4): a malformed/oversized tool argument fragment
    /// surfaces as a fatal TranslateError rather than panicking or silently dropping.
    #[test]
    fn oversized_tool_arguments_surface_as_translate_error() {
        let mut t = StreamTranslator::new("msg_1".into(), "claude-3".into());
        let _ = t.start();
        let huge_args = format!(r#"{{"city":"{}"#, "a".repeat(2 * 1024 * 1024));
        let chunk = ChatCompletionChunk {
            choices: vec![ChunkChoice {
                delta: OaiDelta {
                    content: None,
                    tool_calls: Some(vec![DeltaToolCall {
                        index: 0,
                        id: Some("call_1".into()),
                        function: Some(DeltaFunctionCall {
                            name: Some("get_weather".into()),
                            arguments: Some(huge_args),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let err = t.feed(&chunk).unwrap_err();
        assert!(matches!(err, TranslateError::Parser(_)));
    }
}

//! Bidirectional Anthropic <-> OpenAI translation for the non-streaming path
//! (§4.8): request conversion and full-response reconstruction.

use super::anthropic::{self, ContentBlock, Message, MessageContent, MessagesRequest, MessagesResponse, Usage};
use super::openai::{self, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, FunctionSpec, ToolCall, ToolSpec};
use super::schema::rewrite_schema;
use crate::error::TranslateError;

/// Converts an Anthropic `Message` request into an OpenAI chat completion request (§4.8).
pub fn anthropic_to_openai_request(req: &MessagesRequest, model_override: Option<&str>) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        let text = system.blocks().join("");
        if !text.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(text),
                tool_calls: None,
                tool_call_id: None,
            });
        }
    }

    for msg in &req.messages {
        messages.extend(translate_message(msg));
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| {
                let mut parameters = t.input_schema.clone();
                rewrite_schema(&mut parameters);
                ToolSpec {
                    spec_type: "function",
                    function: FunctionSpec {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters,
                    },
                }
            })
            .collect()
    });

    ChatCompletionRequest {
        model: model_override.unwrap_or(&req.model).to_string(),
        messages,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
        stop: req.stop_sequences.clone(),
        stream: req.stream,
        tools,
    }
}

fn translate_message(msg: &Message) -> Vec<ChatMessage> {
    match &msg.content {
        MessageContent::Text(text) => vec![ChatMessage {
            role: msg.role.clone(),
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        }],
        MessageContent::Blocks(blocks) => {
            if msg.role == "user" {
                translate_user_blocks(blocks)
            } else {
                translate_assistant_blocks(blocks)
            }
        }
    }
}

fn translate_user_blocks(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut out = Vec::new();
    let mut text = String::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(content.as_text()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            ContentBlock::ToolUse { .. } => {}
        }
    }
    if !text.is_empty() {
        out.insert(
            0,
            ChatMessage {
                role: "user".to_string(),
                content: Some(text),
                tool_calls: None,
                tool_call_id: None,
            },
        );
    }
    out
}

fn translate_assistant_blocks(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: openai::FunctionCall {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    },
                });
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }
    vec![ChatMessage {
        role: "assistant".to_string(),
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    }]
}

/// Reconstructs a non-streaming Anthropic `Message` from an OpenAI response (§4.8).
pub fn openai_to_anthropic_response(
    resp: &ChatCompletionResponse,
    message_id: String,
    model: String,
) -> Result<MessagesResponse, TranslateError> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| TranslateError::MalformedResponse("no choices in upstream response".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = &choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.clone() });
        }
    }
    if let Some(tool_calls) = &choice.message.tool_calls {
        for tc in tool_calls {
            // §4.8: malformed `function.arguments` JSON degrades to a text
            // block carrying the raw payload rather than a synthetic tool call.
            match serde_json::from_str(&tc.function.arguments) {
                Ok(input) => content.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    input,
                }),
                Err(_) => content.push(ContentBlock::Text {
                    text: tc.function.arguments.clone(),
                }),
            }
        }
    }

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(MessagesResponse {
        id: message_id,
        response_type: "message",
        role: "assistant",
        content,
        model,
        stop_reason: Some(anthropic::map_stop_reason(&choice.finish_reason)),
        stop_sequence: None,
        usage,
    })
}

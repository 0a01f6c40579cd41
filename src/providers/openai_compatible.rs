//! OpenAI chat-completions wire format.
//!
//! Shared by every vendor whose endpoint is OpenAI-compatible (Mistral, ZhiPuAI).
//!
//! # Streaming
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"x","arguments":""}}]}}]}
//! data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{}"}}]}}]}
//! data: [DONE]
//! ```
//!
//! Tool-call deltas are fragments keyed by `index`; the normalizer merges them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{WireRequest, WireResponse};
use crate::error::{LlmError, Result};
use crate::stream::{ChunkPayload, LineEvent, ToolCallFragment};
use crate::traits::{ChatMessage, ToolCall, ToolDefinition, Usage};

/// Build the chat completions endpoint URL.
pub fn chat_completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessageRequest<'a>>,
    stream: bool,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageRequest<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallRequest<'a>>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ToolCallRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'a str,
    function: FunctionCallRequest<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FunctionCallRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

/// Convert messages to the wire form. Tool-call `index` stays client-side.
pub(crate) fn convert_messages(messages: &[ChatMessage]) -> Vec<MessageRequest<'_>> {
    messages
        .iter()
        .map(|msg| MessageRequest {
            role: msg.role.as_str(),
            content: &msg.content,
            tool_call_id: msg.tool_call_id.as_deref(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| ToolCallRequest {
                        id: &call.id,
                        call_type: &call.call_type,
                        function: FunctionCallRequest {
                            name: &call.function.name,
                            arguments: &call.function.arguments,
                        },
                    })
                    .collect()
            }),
        })
        .collect()
}

pub fn build_body(request: &WireRequest<'_>) -> Result<JsonValue> {
    let body = ChatRequest {
        model: request.api_model,
        messages: convert_messages(request.messages),
        stream: request.stream,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        tools: request.tools,
        tool_choice: request.tools.map(|_| request.tool_choice),
    };
    Ok(serde_json::to_value(body)?)
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolCallResponse {
    id: Option<String>,
    function: FunctionCallResponse,
}

#[derive(Debug, Deserialize)]
struct FunctionCallResponse {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl ToolCallResponse {
    pub(crate) fn into_tool_call(self, index: usize) -> ToolCall {
        let id = self
            .id
            .unwrap_or_else(crate::tool_protocol::new_call_id);
        ToolCall::new(index, id, self.function.name, self.function.arguments)
    }

    pub(crate) fn into_fragment(self, index: usize) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: self.id,
            name: Some(self.function.name),
            arguments: Some(self.function.arguments),
        }
    }
}

/// Usage as vendors report it. Any field may be missing.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireUsage {
    prompt_tokens: Option<usize>,
    completion_tokens: Option<usize>,
    total_tokens: Option<usize>,
}

impl WireUsage {
    pub(crate) fn into_usage(self) -> Usage {
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(prompt), Some(completion)) => Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: self.total_tokens.unwrap_or(prompt + completion),
            },
            _ => Usage::total_only(self.total_tokens.unwrap_or(0)),
        }
    }
}

pub fn parse_response(body: JsonValue) -> Result<WireResponse> {
    let response: ChatResponse = serde_json::from_value(body)?;
    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .ok_or_else(|| LlmError::ProviderError {
            status: 200,
            body: "response has no choices".to_string(),
        })?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, call)| call.into_tool_call(i))
        .collect();

    Ok(WireResponse {
        content: message.content.unwrap_or_default(),
        tool_calls,
        usage: response.usage.map(WireUsage::into_usage).unwrap_or_default(),
    })
}

// ============================================================================
// Stream chunk types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Decode one `data:` line.
pub fn decode_stream_line(line: &str) -> Result<LineEvent> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank keep-alives, SSE comments and `event:` lines.
        return Ok(LineEvent::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }

    let chunk: ChatStreamChunk = serde_json::from_str(data).map_err(|e| {
        LlmError::MalformedStreamChunk(format!("{} | data: {}", e, preview(data)))
    })?;

    let mut payload = ChunkPayload {
        usage: chunk.usage.map(WireUsage::into_usage),
        ..Default::default()
    };
    if let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) {
        payload.content = delta.content.filter(|c| !c.is_empty());
        payload.tool_calls = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, call)| {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallFragment {
                    index: call.index.unwrap_or(position),
                    id: call.id,
                    name,
                    arguments,
                }
            })
            .collect();
    }
    Ok(LineEvent::Payload(payload))
}

pub(crate) fn preview(data: &str) -> &str {
    match data.char_indices().nth(200) {
        Some((end, _)) => &data[..end],
        None => data,
    }
}

//! MiniMax chat completion.
//!
//! # Wire Quirks
//!
//! - The configured base URL is the complete endpoint.
//! - Tool `parameters` are sent as a JSON-encoded string, not an object.
//! - `mask_sensitive_info` is always disabled.
//! - Stream lines are `data: {json}`; the payload starts at byte 6.
//! - Usage carries only `total_tokens`.
//! - A streamed tool call arrives as full snapshots in `message.tool_calls`;
//!   the snapshot on the chunk that also carries `usage` is final.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::openai_compatible::{convert_messages, preview, MessageRequest, ToolCallResponse};
use super::{EndpointShape, ModelSpec, ProviderDescriptor, WireRequest, WireResponse};
use crate::error::{LlmError, Result};
use crate::stream::{ChunkPayload, LineEvent};
use crate::tokenizer::SizeUnit;
use crate::traits::Usage;

/// Length of the `data: ` prefix on every stream line.
const STREAM_PREFIX_LEN: usize = 6;

const MODELS: &[ModelSpec] = &[
    ModelSpec::new("abab5-chat", "abab5-chat", 6144, true),
    ModelSpec::new("abab5.5-chat", "abab5.5-chat", 16384, true),
    ModelSpec::new("abab6-chat", "abab6-chat", 32768, true),
    ModelSpec::new("abab6.5s-chat", "abab6.5s-chat", 245760, true),
];

pub static MINIMAX: ProviderDescriptor = ProviderDescriptor {
    name: "minimax",
    default_model: "abab5.5-chat",
    models: MODELS,
    api_key_setting: "minimax_api_key",
    api_base_setting: "minimax_api_base",
    default_api_base: Some("https://api.minimax.chat/v1/text/chatcompletion_v2"),
    endpoint: EndpointShape::MiniMax,
    size_unit: SizeUnit::Tokens,
    default_max_tokens: 2048,
    unescape_underscores: false,
};

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Serialize)]
struct MiniMaxRequest<'a> {
    model: &'a str,
    messages: Vec<MessageRequest<'a>>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
    mask_sensitive_info: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<MiniMaxTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MiniMaxTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: MiniMaxFunction<'a>,
}

#[derive(Debug, Serialize)]
struct MiniMaxFunction<'a> {
    name: &'a str,
    description: &'a str,
    /// JSON schema encoded as a string.
    parameters: String,
}

pub fn build_body(request: &WireRequest<'_>) -> Result<JsonValue> {
    let tools = request
        .tools
        .map(|tools| {
            tools
                .iter()
                .map(|tool| {
                    Ok(MiniMaxTool {
                        tool_type: "function",
                        function: MiniMaxFunction {
                            name: &tool.function.name,
                            description: &tool.function.description,
                            parameters: serde_json::to_string(&tool.function.parameters)?,
                        },
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let body = MiniMaxRequest {
        model: request.api_model,
        messages: convert_messages(request.messages),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream: request.stream,
        mask_sensitive_info: false,
        tool_choice: tools.as_ref().map(|_| request.tool_choice),
        tools,
    };
    Ok(serde_json::to_value(body)?)
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Deserialize)]
struct MiniMaxResponse {
    #[serde(default)]
    choices: Vec<MiniMaxChoice>,
    usage: Option<MiniMaxUsage>,
}

#[derive(Debug, Deserialize)]
struct MiniMaxChoice {
    delta: Option<MiniMaxMessage>,
    message: Option<MiniMaxMessage>,
}

#[derive(Debug, Deserialize)]
struct MiniMaxMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct MiniMaxUsage {
    #[serde(default)]
    total_tokens: usize,
}

impl From<MiniMaxUsage> for Usage {
    fn from(usage: MiniMaxUsage) -> Self {
        Usage::total_only(usage.total_tokens)
    }
}

pub fn parse_response(body: JsonValue) -> Result<WireResponse> {
    let response: MiniMaxResponse = serde_json::from_value(body)?;
    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .ok_or_else(|| LlmError::ProviderError {
            status: 200,
            body: "response has no choices".to_string(),
        })?;

    Ok(WireResponse {
        content: message.content.unwrap_or_default(),
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, call)| call.into_tool_call(i))
            .collect(),
        usage: response.usage.map(Usage::from).unwrap_or_default(),
    })
}

/// Decode one stream line.
pub fn decode_stream_line(line: &str) -> Result<LineEvent> {
    if line.trim().is_empty() {
        return Ok(LineEvent::Skip);
    }
    let data = line
        .get(STREAM_PREFIX_LEN..)
        .ok_or_else(|| LlmError::MalformedStreamChunk(format!("short line: {}", line)))?;
    if data.trim() == "[DONE]" {
        return Ok(LineEvent::Done);
    }

    let chunk: MiniMaxResponse = serde_json::from_str(data).map_err(|e| {
        LlmError::MalformedStreamChunk(format!("{} | data: {}", e, preview(data)))
    })?;

    let mut payload = ChunkPayload {
        usage: chunk.usage.map(Usage::from),
        ..Default::default()
    };
    if let Some(choice) = chunk.choices.into_iter().next() {
        let (delta_content, delta_calls) = match choice.delta {
            Some(delta) => (delta.content, delta.tool_calls),
            None => (None, None),
        };
        let calls = delta_calls
            .or_else(|| choice.message.and_then(|m| m.tool_calls))
            .unwrap_or_default();
        payload.content = delta_content.filter(|c| !c.is_empty());
        payload.tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| call.into_fragment(i))
            .collect();
    }
    Ok(LineEvent::Payload(payload))
}

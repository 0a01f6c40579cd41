//! Text protocol for emulated tool calling.
//!
//! Models without native function calling are told, through an injected
//! system instruction, to wrap tool invocations in a sentinel-delimited block:
//!
//! ```text
//! Let me check. <|▶|>{"name": "get_weather", "arguments": {"city": "Paris"}}<|◀|>
//! ```
//!
//! # Encode
//!
//! [`inject_tool_prompt`] renders the tool list into a fixed instruction and
//! appends it to a leading system message, or inserts one.
//!
//! # Decode
//!
//! [`decode_tool_calls`] parses every block of a complete text.
//! [`StreamingToolDecoder`] does the same for text arriving in chunks: it
//! releases text as soon as it is known not to belong to a block, and holds
//! back any trailing prefix of the start sentinel (`<`, `<|`, `<|▶`, `<|▶|`).

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{LlmError, Result};
use crate::traits::{ChatMessage, ToolCall, ToolDefinition};

/// Opens a tool-call block.
pub const TOOL_CALL_START: &str = "<|▶|>";

/// Closes a tool-call block.
pub const TOOL_CALL_END: &str = "<|◀|>";

// ============================================================================
// Encode
// ============================================================================

const TOOL_PROMPT_TEMPLATE: &str = "You have access to the following tools, described as JSON:
{tools}

When a tool is needed, answer with a tool-call block. The block starts with <|▶|> and ends with <|◀|>. \
Inside the block write one JSON object of the form {\"name\": \"<tool name>\", \"arguments\": {<arguments matching the tool parameters>}}. \
To call several tools at once, write a JSON array of such objects inside a single block. \
Put any explanation before the block, never inside it, and only call tools listed above.";

/// Render the system instruction describing `tools`.
pub fn tool_use_system_prompt(tools: &[ToolDefinition]) -> Result<String> {
    let rendered = serde_json::to_string(tools)?;
    Ok(TOOL_PROMPT_TEMPLATE.replace("{tools}", &rendered))
}

/// Add the tool instruction to the conversation.
///
/// Appended after a blank line to a leading system message, otherwise
/// inserted as a new leading system message.
pub fn inject_tool_prompt(
    messages: &mut Vec<ChatMessage>,
    tools: &[ToolDefinition],
) -> Result<()> {
    let prompt = tool_use_system_prompt(tools)?;
    match messages.first_mut() {
        Some(first) if first.is_system() => {
            first.content.push_str("\n\n");
            first.content.push_str(&prompt);
        }
        _ => messages.insert(0, ChatMessage::system(prompt)),
    }
    Ok(())
}

// ============================================================================
// Marker scanning
// ============================================================================

/// Where a text stands relative to the start sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    /// No sentinel and no trailing sentinel prefix.
    NoMarker,
    /// The text ends with this proper prefix of the sentinel.
    Partial(String),
    /// The sentinel starts at this byte offset.
    Complete(usize),
}

/// Classify `text` against [`TOOL_CALL_START`].
pub fn scan_marker(text: &str) -> MarkerState {
    if let Some(at) = text.find(TOOL_CALL_START) {
        return MarkerState::Complete(at);
    }
    // Longest proper prefix first.
    let boundaries = TOOL_CALL_START.char_indices().skip(1).map(|(i, _)| i);
    let mut longest = None;
    for end in boundaries {
        let prefix = &TOOL_CALL_START[..end];
        if text.ends_with(prefix) {
            longest = Some(prefix);
        }
    }
    match longest {
        Some(prefix) => MarkerState::Partial(prefix.to_string()),
        None => MarkerState::NoMarker,
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Text with tool-call blocks removed, plus the calls they contained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedText {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Replace the `\_` escape some models put in generated identifiers.
pub fn unescape_underscores(text: &str) -> String {
    text.replace("\\_", "_")
}

/// Parse every tool-call block in `text`.
///
/// Returns the text untouched when it contains no block. Fails with
/// [`LlmError::ToolParseError`] when a block is unclosed or its interior is
/// not a tool invocation.
pub fn decode_tool_calls(text: &str) -> Result<DecodedText> {
    let mut decoded = DecodedText::default();
    let mut rest = text;

    while let Some(start) = rest.find(TOOL_CALL_START) {
        decoded.content.push_str(&rest[..start]);
        let after_start = &rest[start + TOOL_CALL_START.len()..];
        let end = after_start
            .find(TOOL_CALL_END)
            .ok_or_else(|| LlmError::ToolParseError("unclosed tool-call block".to_string()))?;
        parse_block(&after_start[..end], &mut decoded.tool_calls)?;
        rest = &after_start[end + TOOL_CALL_END.len()..];
    }
    decoded.content.push_str(rest);
    Ok(decoded)
}

fn parse_block(interior: &str, calls: &mut Vec<ToolCall>) -> Result<()> {
    let value: JsonValue = serde_json::from_str(interior.trim())
        .map_err(|e| LlmError::ToolParseError(format!("block is not JSON: {}", e)))?;

    match value {
        JsonValue::Array(items) => {
            for item in items {
                calls.push(parse_invocation(item, calls.len())?);
            }
        }
        item @ JsonValue::Object(_) => calls.push(parse_invocation(item, calls.len())?),
        other => {
            return Err(LlmError::ToolParseError(format!(
                "expected an object or array, got {}",
                other
            )))
        }
    }
    Ok(())
}

fn parse_invocation(item: JsonValue, index: usize) -> Result<ToolCall> {
    let JsonValue::Object(mut fields) = item else {
        return Err(LlmError::ToolParseError(
            "tool invocation must be an object".to_string(),
        ));
    };

    let name = match fields.remove("name") {
        Some(JsonValue::String(name)) if !name.is_empty() => name,
        _ => {
            return Err(LlmError::ToolParseError(
                "tool invocation has no name".to_string(),
            ))
        }
    };

    let arguments = match fields.remove("arguments") {
        None | Some(JsonValue::Null) => "{}".to_string(),
        Some(JsonValue::String(raw)) => raw,
        Some(structured) => structured.to_string(),
    };

    Ok(ToolCall::new(index, new_call_id(), name, arguments))
}

/// Fresh id for a synthesized tool call.
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Streaming decoder
// ============================================================================

/// Incremental decoder for one emulated-tool-calling stream.
///
/// Each call owns its own decoder, so concurrent streams never share a buffer.
#[derive(Debug, Default)]
pub struct StreamingToolDecoder {
    buffer: String,
    released: usize,
    marker_seen: bool,
    unescape: bool,
    pending_backslash: bool,
}

impl StreamingToolDecoder {
    pub fn new(unescape: bool) -> Self {
        Self {
            unescape,
            ..Default::default()
        }
    }

    /// Feed one chunk of generated text and return the text that is now safe
    /// to show, if any.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.append(chunk);
        if self.marker_seen {
            return None;
        }

        let pending = &self.buffer[self.released..];
        let safe = match scan_marker(pending) {
            MarkerState::NoMarker => pending.len(),
            MarkerState::Partial(prefix) => pending.len() - prefix.len(),
            MarkerState::Complete(at) => {
                self.marker_seen = true;
                at
            }
        };

        if safe == 0 {
            return None;
        }
        let text = pending[..safe].to_string();
        self.released += safe;
        Some(text)
    }

    fn append(&mut self, chunk: &str) {
        if !self.unescape {
            self.buffer.push_str(chunk);
            return;
        }
        let mut text = String::with_capacity(chunk.len() + 1);
        if self.pending_backslash {
            text.push('\\');
            self.pending_backslash = false;
        }
        text.push_str(chunk);
        if text.ends_with('\\') {
            text.pop();
            self.pending_backslash = true;
        }
        self.buffer.push_str(&unescape_underscores(&text));
    }

    /// True once the start sentinel has been seen.
    pub fn marker_seen(&self) -> bool {
        self.marker_seen
    }

    /// Decode whatever has not been released yet.
    pub fn try_finish(&self) -> Result<DecodedText> {
        let mut tail = self.buffer[self.released..].to_string();
        if self.pending_backslash {
            tail.push('\\');
        }
        if !self.marker_seen {
            // A sentinel prefix left at the very end is a truncated control
            // token, not text.
            if let MarkerState::Partial(prefix) = scan_marker(&tail) {
                tail.truncate(tail.len() - prefix.len());
            }
            return Ok(DecodedText {
                content: tail,
                tool_calls: Vec::new(),
            });
        }
        decode_tool_calls(&tail)
    }

    /// Close the stream. A malformed block is logged and its raw text
    /// returned without tool calls.
    pub fn finish(self) -> DecodedText {
        match self.try_finish() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "emulated tool-call block could not be parsed");
                let mut content = self.buffer[self.released..].to_string();
                if self.pending_backslash {
                    content.push('\\');
                }
                DecodedText {
                    content,
                    tool_calls: Vec::new(),
                }
            }
        }
    }
}

//! Shared data shapes and the transport seam.
//!
//! # Key Types
//!
//! - [`ChatMessage`] / [`ChatRole`]: ordered conversation turns
//! - [`ToolDefinition`] / [`ToolCall`]: OpenAI-style function calling shapes
//! - [`Usage`]: token accounting passed through from the vendor
//! - [`CompletionResponse`]: non-streaming result
//! - [`CompletionDelta`]: one normalized event of a streaming result
//! - [`HttpTransport`]: the HTTP collaborator every adapter talks through
//!
//! Vendor payloads never leave the adapter: callers only see these types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

// ============================================================================
// Messages
// ============================================================================

/// Role of a chat message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions for the model.
    System,
    /// Human input.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool execution.
    Tool,
}

impl ChatRole {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }
}

/// One turn of a conversation. Order within a sequence is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: ChatRole,

    /// Text content of the message.
    #[serde(default)]
    pub content: String,

    /// Tool calls made by the assistant (assistant role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool call this message answers (tool role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role(ChatRole::Assistant, content);
        msg.tool_calls = Some(calls);
        msg
    }

    /// Create a tool result message.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(ChatRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// True for system messages.
    pub fn is_system(&self) -> bool {
        self.role == ChatRole::System
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Definition of a tool the model may call.
///
/// Serializes in the OpenAI wire form `{"type": "function", "function": {...}}`.
/// Deserializes from either that form or the flat `{name, description, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolDefinitionRepr")]
pub struct ToolDefinition {
    /// Type of tool (always "function").
    #[serde(rename = "type")]
    pub tool_type: String,

    /// Function definition.
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Create a new function tool definition.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonValue,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Name, description and JSON-schema parameters of a callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "empty_object")]
    pub parameters: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolDefinitionRepr {
    Wire {
        #[serde(rename = "type", default = "function_type")]
        tool_type: String,
        function: FunctionDefinition,
    },
    Flat(FunctionDefinition),
}

impl From<ToolDefinitionRepr> for ToolDefinition {
    fn from(repr: ToolDefinitionRepr) -> Self {
        match repr {
            ToolDefinitionRepr::Wire {
                tool_type,
                function,
            } => Self {
                tool_type,
                function,
            },
            ToolDefinitionRepr::Flat(function) => Self {
                tool_type: function_type(),
                function,
            },
        }
    }
}

/// A tool call produced by the model.
///
/// `index` orders calls within one response and is stable across streamed
/// chunks; `id` is unique within one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub index: usize,

    pub id: String,

    /// Type of tool (always "function").
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,

    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a function tool call.
    pub fn new(
        index: usize,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            index,
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Raw JSON-encoded arguments.
    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

// ============================================================================
// Results
// ============================================================================

/// Token accounting for one completion.
///
/// Vendors that only report a total yield `prompt_tokens = 0` and
/// `completion_tokens = total_tokens`; do not treat the split as meaningful
/// for every provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Usage with a prompt/completion split.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage for vendors reporting only a combined total.
    pub fn total_only(total_tokens: usize) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: total_tokens,
            total_tokens,
        }
    }
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text, with any emulated tool-call block stripped.
    pub content: String,

    pub usage: Usage,

    /// Always [`ChatRole::Assistant`].
    pub role: ChatRole,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Caller-facing model name the request was made with.
    pub model: String,
}

impl CompletionResponse {
    /// Create an assistant response.
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: Usage::default(),
            role: ChatRole::Assistant,
            tool_calls: Vec::new(),
            model: model.into(),
        }
    }

    /// Set token usage.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Attach tool calls.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Check if the model requested tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One normalized event of a streaming completion.
///
/// At most one event per stream carries `usage`, and that event carries no
/// new content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDelta {
    /// New text since the previous event, if any.
    pub content: Option<String>,

    /// Always [`ChatRole::Assistant`].
    pub role: ChatRole,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionDelta {
    /// Text-only event.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            role: ChatRole::Assistant,
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    /// Tool-call announcement, optionally closing the stream's accounting.
    pub fn tool_calls(calls: Vec<ToolCall>, usage: Option<Usage>) -> Self {
        Self {
            content: None,
            role: ChatRole::Assistant,
            tool_calls: calls,
            usage,
        }
    }

    /// Text of this event, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Check if this event announces tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Inbound request. Unset fields fall back to the client defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub stream: Option<bool>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<usize>,

    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Tool-choice policy string ("auto", "none", ...).
    #[serde(default)]
    pub tool_choice: Option<String>,
}

impl CompletionRequest {
    /// Create a request for the given conversation.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: impl Into<String>) -> Self {
        self.tool_choice = Some(tool_choice.into());
        self
    }
}

// ============================================================================
// Transport seam
// ============================================================================

/// Stream of raw response lines, newline terminators removed.
pub type LineStream = BoxStream<'static, Result<String>>;

/// A single authenticated JSON POST.
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub api_key: String,
    pub body: JsonValue,
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("body", &self.body)
            .finish()
    }
}

/// HTTP collaborator used by every provider adapter.
///
/// Implementations map non-2xx responses to [`crate::LlmError::ProviderError`]
/// and connection failures to transport errors. They never retry.
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// POST `body` and decode the JSON response.
    async fn post_json(&self, request: &HttpRequest) -> Result<JsonValue>;

    /// POST `body` and return the response as a lazy stream of lines.
    ///
    /// Dropping the stream closes the underlying connection.
    async fn post_stream(&self, request: &HttpRequest) -> Result<LineStream>;
}

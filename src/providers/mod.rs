//! Provider descriptors and vendor wire codecs.
//!
//! Every vendor is served by the same adapter. What differs is data:
//!
//! | Descriptor | Endpoint shape | Budget unit | Tool calling |
//! |------------|----------------|-------------|--------------|
//! | [`MINIMAX`] | MiniMax SSE dialect | tokens | native |
//! | [`MISTRAL`] | OpenAI chat | characters | native, `mistral-medium` emulated |
//! | [`ZHIPUAI`] | OpenAI chat | tokens | native, `glm-4v` emulated |

pub mod minimax;
pub mod mistral;
pub mod openai_compatible;
pub mod zhipuai;

pub use minimax::MINIMAX;
pub use mistral::MISTRAL;
pub use zhipuai::ZHIPUAI;

use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::stream::LineEvent;
use crate::tokenizer::SizeUnit;
use crate::traits::{ChatMessage, ToolCall, ToolDefinition, Usage};

/// One entry of a provider's model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Caller-facing model name.
    pub name: &'static str,
    /// Identifier sent to the vendor.
    pub api_name: &'static str,
    /// Maximum input budget, in the provider's [`SizeUnit`].
    pub max_input: usize,
    pub native_tool_calling: bool,
}

impl ModelSpec {
    pub const fn new(
        name: &'static str,
        api_name: &'static str,
        max_input: usize,
        native_tool_calling: bool,
    ) -> Self {
        Self {
            name,
            api_name,
            max_input,
            native_tool_calling,
        }
    }
}

/// Static description of a vendor.
#[derive(Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub default_model: &'static str,
    pub models: &'static [ModelSpec],
    pub api_key_setting: &'static str,
    pub api_base_setting: &'static str,
    /// Public endpoint used when the base setting is absent.
    pub default_api_base: Option<&'static str>,
    pub endpoint: EndpointShape,
    pub size_unit: SizeUnit,
    pub default_max_tokens: usize,
    /// Replace `\_` with `_` in generated text.
    pub unescape_underscores: bool,
}

impl ProviderDescriptor {
    /// Look up a model by its caller-facing name.
    pub fn model(&self, name: &str) -> Option<&'static ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Caller-facing names of every known model.
    pub fn model_names(&self) -> Vec<&'static str> {
        self.models.iter().map(|m| m.name).collect()
    }
}

/// Wire protocol family of a vendor endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointShape {
    /// MiniMax chatcompletion: base URL is the full endpoint, stream lines
    /// carry a fixed 6-character prefix, usage reports only a total.
    MiniMax,
    /// OpenAI `/chat/completions` with `data:` SSE lines and `[DONE]`.
    OpenAiChat,
}

/// Everything an endpoint needs to build a request body.
#[derive(Debug, Clone)]
pub struct WireRequest<'a> {
    pub api_model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
    /// Present only when tools go through the vendor's native mechanism.
    pub tools: Option<&'a [ToolDefinition]>,
    pub tool_choice: &'a str,
}

/// Decoded non-streaming vendor response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl EndpointShape {
    /// Request URL for a configured base.
    pub fn url(&self, api_base: &str) -> String {
        match self {
            Self::MiniMax => api_base.to_string(),
            Self::OpenAiChat => openai_compatible::chat_completions_url(api_base),
        }
    }

    pub fn build_body(&self, request: &WireRequest<'_>) -> Result<JsonValue> {
        match self {
            Self::MiniMax => minimax::build_body(request),
            Self::OpenAiChat => openai_compatible::build_body(request),
        }
    }

    pub fn parse_response(&self, body: JsonValue) -> Result<WireResponse> {
        match self {
            Self::MiniMax => minimax::parse_response(body),
            Self::OpenAiChat => openai_compatible::parse_response(body),
        }
    }

    /// Decode one raw stream line.
    pub fn decode_line(&self, line: &str) -> Result<LineEvent> {
        match self {
            Self::MiniMax => minimax::decode_stream_line(line),
            Self::OpenAiChat => openai_compatible::decode_stream_line(line),
        }
    }

    /// True when a chunk's tool calls are complete snapshots rather than
    /// deltas to be merged by index.
    pub fn tool_calls_are_snapshots(&self) -> bool {
        matches!(self, Self::MiniMax)
    }
}

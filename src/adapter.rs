//! Provider adapter.
//!
//! One adapter type serves every vendor; behavior comes from the
//! [`ProviderDescriptor`] it is built with.
//!
//! # Request pipeline
//!
//! 1. Look up the model. Unknown models fail before any network call.
//! 2. Truncate the conversation to the model's input budget.
//! 3. Pick the tool strategy: emulated when tools are given and the model
//!    lacks native function calling, native otherwise.
//! 4. Emulated: inject the tool instruction as a system message.
//! 5. Build the vendor body and send it through the transport.
//! 6. Decode into a [`CompletionResponse`] or a normalized [`EventStream`].

use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::{LlmError, Result};
use crate::providers::{ProviderDescriptor, WireRequest, WireResponse};
use crate::stream::{normalize, EventStream, StreamNormalizer, ToolStrategy};
use crate::tokenizer::SizeEstimator;
use crate::tool_protocol::{decode_tool_calls, inject_tool_prompt, unescape_underscores};
use crate::traits::{ChatMessage, CompletionResponse, HttpRequest, ToolDefinition};
use crate::transport::TransportSlot;
use crate::truncation::truncate_messages;

/// A request with every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: usize,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
}

/// Outcome of a completion call.
pub enum Completion {
    Response(CompletionResponse),
    Stream(EventStream),
}

impl Completion {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// The single result, if streaming was off.
    pub fn into_response(self) -> Option<CompletionResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Stream(_) => None,
        }
    }

    /// The event stream, if streaming was on.
    pub fn into_stream(self) -> Option<EventStream> {
        match self {
            Self::Stream(events) => Some(events),
            Self::Response(_) => None,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Capability-table-driven adapter for one provider.
#[derive(Debug)]
pub struct ProviderAdapter {
    descriptor: &'static ProviderDescriptor,
    credentials: Credentials,
    estimator: SizeEstimator,
    transport: TransportSlot,
}

impl ProviderAdapter {
    pub fn new(
        descriptor: &'static ProviderDescriptor,
        credentials: Credentials,
        transport: TransportSlot,
    ) -> Result<Self> {
        Ok(Self {
            descriptor,
            credentials,
            estimator: SizeEstimator::for_unit(descriptor.size_unit)?,
            transport,
        })
    }

    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        self.descriptor
    }

    /// Run one completion.
    pub async fn completion(&self, request: ResolvedRequest) -> Result<Completion> {
        let descriptor = self.descriptor;
        let spec = descriptor
            .model(&request.model)
            .ok_or_else(|| LlmError::unknown_model(descriptor.name, &request.model))?;

        let mut messages = truncate_messages(request.messages, spec.max_input, &self.estimator);
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "no messages left to send".to_string(),
            ));
        }

        let strategy = if !request.tools.is_empty() && !spec.native_tool_calling {
            ToolStrategy::Emulated
        } else {
            ToolStrategy::Native
        };
        if strategy == ToolStrategy::Emulated {
            inject_tool_prompt(&mut messages, &request.tools)?;
        }
        let native_tools = (strategy == ToolStrategy::Native && !request.tools.is_empty())
            .then_some(request.tools.as_slice());

        let endpoint = descriptor.endpoint;
        let body = endpoint.build_body(&WireRequest {
            api_model: spec.api_name,
            messages: &messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: request.stream,
            tools: native_tools,
            tool_choice: &request.tool_choice,
        })?;
        let http = HttpRequest {
            url: endpoint.url(&self.credentials.api_base),
            api_key: self.credentials.api_key.clone(),
            body,
        };

        debug!(
            provider = descriptor.name,
            model = spec.name,
            stream = request.stream,
            strategy = ?strategy,
            messages = messages.len(),
            "completion request"
        );

        let transport = self.transport.acquire().await?;
        if request.stream {
            let lines = transport.post_stream(&http).await?;
            let normalizer = StreamNormalizer::new(
                descriptor.name,
                endpoint,
                strategy,
                descriptor.unescape_underscores,
            );
            Ok(Completion::Stream(normalize(lines, normalizer)))
        } else {
            let body = transport.post_json(&http).await?;
            let wire = endpoint.parse_response(body)?;
            Ok(Completion::Response(self.finish_response(
                wire,
                strategy,
                spec.name,
            )))
        }
    }

    fn finish_response(
        &self,
        wire: WireResponse,
        strategy: ToolStrategy,
        model: &str,
    ) -> CompletionResponse {
        let mut content = wire.content;
        if self.descriptor.unescape_underscores {
            content = unescape_underscores(&content);
        }

        let tool_calls = match strategy {
            ToolStrategy::Native => wire.tool_calls,
            ToolStrategy::Emulated => match decode_tool_calls(&content) {
                Ok(decoded) => {
                    content = decoded.content;
                    decoded.tool_calls
                }
                Err(e) => {
                    warn!(
                        provider = self.descriptor.name,
                        error = %e,
                        "emulated tool-call block could not be parsed"
                    );
                    Vec::new()
                }
            },
        };

        CompletionResponse::new(content, model)
            .with_usage(wire.usage)
            .with_tool_calls(tool_calls)
    }

    /// Release the pooled transport.
    pub async fn shutdown(&self) {
        self.transport.release().await;
    }

    /// True while the pooled transport is held.
    pub async fn transport_acquired(&self) -> bool {
        self.transport.is_acquired().await
    }
}

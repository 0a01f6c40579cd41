//! UniChat LLM - uniform streaming chat completion over vendor APIs
//!
//! One request shape and one response shape for several chat-completion
//! vendors, whether or not they support function calling natively.
//!
//! # Providers
//!
//! | Provider | Endpoint | Native tools | Budget unit | Notes |
//! |----------|----------|--------------|-------------|-------|
//! | MiniMax | MiniMax SSE dialect | ✓ | tokens | total-only usage |
//! | Mistral | OpenAI-compatible | all but `mistral-medium` | characters | `\_` unescaped |
//! | ZhiPuAI | OpenAI-compatible | all but `glm-4v` | tokens | |
//!
//! # Architecture
//!
//! - [`ProviderAdapter`]: one adapter type, configured by a static
//!   [`ProviderDescriptor`]
//! - [`tool_protocol`]: tool calling emulated through marker-delimited text
//! - [`StreamNormalizer`]: vendor stream lines to [`CompletionDelta`] events
//! - [`truncate_messages`]: drops the oldest turns to fit the model's input
//! - [`ChatClient`] / [`BlockingChatClient`]: async and blocking facades
//!
//! # Example
//!
//! ```rust,no_run
//! use unichat_llm::{ChatClient, ChatMessage, CompletionRequest, ProviderKind};
//!
//! # async fn run() -> unichat_llm::Result<()> {
//! let client = ChatClient::new(ProviderKind::ZhiPuAi)?;
//! let request = CompletionRequest::new(vec![
//!     ChatMessage::system("You are terse."),
//!     ChatMessage::user("Name a prime."),
//! ])
//! .with_stream(false);
//!
//! let response = client.completion(request).await?.into_response().unwrap();
//! println!("{} ({} tokens)", response.content, response.usage.total_tokens);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod blocking;
pub mod completion;
pub mod config;
pub mod error;
pub mod factory;
pub mod providers;
pub mod stream;
pub mod tokenizer;
pub mod tool_protocol;
pub mod traits;
pub mod transport;
pub mod truncation;

pub use adapter::{Completion, ProviderAdapter, ResolvedRequest};
pub use blocking::{BlockingChatClient, BlockingCompletion, BlockingEventStream};
pub use completion::ChatClient;
pub use config::{ClientDefaults, Credentials, Settings, DEFAULT_TIMEOUT, SETTINGS_PATH_ENV};
pub use error::{LlmError, Result};
pub use factory::ProviderKind;
pub use providers::{EndpointShape, ModelSpec, ProviderDescriptor, MINIMAX, MISTRAL, ZHIPUAI};
pub use stream::{EventStream, NormalizerState, StreamNormalizer, ToolStrategy};
pub use tokenizer::{SizeEstimator, SizeUnit, Tokenizer};
pub use tool_protocol::{
    decode_tool_calls, StreamingToolDecoder, TOOL_CALL_END, TOOL_CALL_START,
};
pub use traits::{
    ChatMessage, ChatRole, CompletionDelta, CompletionRequest, CompletionResponse,
    FunctionCall, FunctionDefinition, HttpRequest, HttpTransport, LineStream, ToolCall,
    ToolDefinition, Usage,
};
pub use transport::{MockReply, MockTransport, ReqwestTransport, TransportSlot};
pub use truncation::truncate_messages;

//! Blocking facade.
//!
//! [`BlockingChatClient`] owns a current-thread tokio runtime and drives the
//! async client on the calling thread. Streaming results are plain iterators:
//! each `next()` blocks until one event is ready.
//!
//! Must not be used from inside an async runtime.
//!
//! ```rust,no_run
//! use unichat_llm::{BlockingChatClient, ChatMessage, CompletionRequest, ProviderKind};
//!
//! let client = BlockingChatClient::new(ProviderKind::MiniMax)?;
//! let request = CompletionRequest::new(vec![ChatMessage::user("Hi")]).with_stream(false);
//! let response = client.completion(request)?.into_response().unwrap();
//! println!("{}", response.content);
//! # Ok::<(), unichat_llm::LlmError>(())
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tokio::runtime::Runtime;

use crate::adapter::Completion;
use crate::completion::ChatClient;
use crate::config::{ClientDefaults, Settings};
use crate::error::{LlmError, Result};
use crate::factory::ProviderKind;
use crate::stream::EventStream;
use crate::traits::{CompletionDelta, CompletionRequest, CompletionResponse, HttpTransport};

fn runtime() -> Result<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| LlmError::ConfigError(format!("Failed to create tokio runtime: {}", e)))
}

/// Synchronous wrapper around [`ChatClient`].
#[derive(Debug)]
pub struct BlockingChatClient {
    client: ChatClient,
    runtime: Arc<Runtime>,
}

impl BlockingChatClient {
    pub fn new(kind: ProviderKind) -> Result<Self> {
        Self::wrap(ChatClient::new(kind)?)
    }

    pub fn from_settings(
        kind: ProviderKind,
        settings: &Settings,
        defaults: ClientDefaults,
    ) -> Result<Self> {
        Self::wrap(ChatClient::from_settings(kind, settings, defaults)?)
    }

    pub fn with_transport(
        kind: ProviderKind,
        settings: &Settings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Self::wrap(ChatClient::with_transport(kind, settings, transport)?)
    }

    /// Wrap an existing async client.
    pub fn wrap(client: ChatClient) -> Result<Self> {
        Ok(Self {
            client,
            runtime: runtime()?,
        })
    }

    pub fn with_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.client = self.client.with_defaults(defaults);
        self
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Run one completion, blocking until the response or the stream is ready.
    pub fn completion(&self, request: CompletionRequest) -> Result<BlockingCompletion> {
        match self.runtime.block_on(self.client.completion(request))? {
            Completion::Response(response) => Ok(BlockingCompletion::Response(response)),
            Completion::Stream(events) => Ok(BlockingCompletion::Stream(BlockingEventStream {
                events,
                runtime: Arc::clone(&self.runtime),
            })),
        }
    }

    pub fn shutdown(&self) {
        self.runtime.block_on(self.client.shutdown());
    }
}

/// Outcome of a blocking completion call.
#[derive(Debug)]
pub enum BlockingCompletion {
    Response(CompletionResponse),
    Stream(BlockingEventStream),
}

impl BlockingCompletion {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn into_response(self) -> Option<CompletionResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<BlockingEventStream> {
        match self {
            Self::Stream(events) => Some(events),
            Self::Response(_) => None,
        }
    }
}

/// Iterator over stream events. Dropping it closes the connection.
pub struct BlockingEventStream {
    events: EventStream,
    runtime: Arc<Runtime>,
}

impl Iterator for BlockingEventStream {
    type Item = Result<CompletionDelta>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.events.next())
    }
}

impl std::fmt::Debug for BlockingEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BlockingEventStream(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatMessage, Usage};
    use crate::transport::{MockReply, MockTransport};
    use serde_json::json;

    fn settings() -> Settings {
        Settings::default().with("zhipuai_api_key", "zp")
    }

    #[test]
    fn test_blocking_response() {
        let mock = Arc::new(MockTransport::new().with_reply(MockReply::Json(json!({
            "choices": [{"message": {"role": "assistant", "content": "pong"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }))));
        let client =
            BlockingChatClient::with_transport(ProviderKind::ZhiPuAi, &settings(), mock.clone())
                .unwrap();

        let request = CompletionRequest::new(vec![ChatMessage::user("ping")]).with_stream(false);
        let response = client.completion(request).unwrap().into_response().unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(response.usage, Usage::new(3, 1));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_blocking_stream_iterates() {
        let mock = Arc::new(MockTransport::new().with_reply(MockReply::lines([
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
            "data: [DONE]",
        ])));
        let client =
            BlockingChatClient::with_transport(ProviderKind::ZhiPuAi, &settings(), mock).unwrap();

        let events = client
            .completion(CompletionRequest::new(vec![ChatMessage::user("x")]))
            .unwrap()
            .into_stream()
            .unwrap();
        let text: String = events.map(|e| e.unwrap().text().to_string()).collect();
        assert_eq!(text, "ab");
        client.shutdown();
    }

    #[test]
    fn test_blocking_unknown_model() {
        let mock = Arc::new(MockTransport::new());
        let client =
            BlockingChatClient::with_transport(ProviderKind::ZhiPuAi, &settings(), mock.clone())
                .unwrap();
        let err = client
            .completion(CompletionRequest::new(vec![ChatMessage::user("x")]).with_model("gpt-4o"))
            .unwrap_err();
        assert!(matches!(err, LlmError::UnknownModel { .. }));
        assert_eq!(mock.call_count(), 0);
    }
}

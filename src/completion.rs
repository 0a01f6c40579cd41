//! Async completion facade.
//!
//! [`ChatClient`] picks the provider adapter, fills unset request fields
//! from [`ClientDefaults`], and owns the transport lifecycle.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use unichat_llm::{ChatClient, ChatMessage, CompletionRequest, ProviderKind};
//!
//! # async fn run() -> unichat_llm::Result<()> {
//! let client = ChatClient::new(ProviderKind::Mistral)?;
//! let request = CompletionRequest::new(vec![ChatMessage::user("Hello")]);
//!
//! let mut events = client.completion(request).await?.into_stream().unwrap();
//! while let Some(event) = events.next().await {
//!     print!("{}", event?.text());
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::adapter::{Completion, ProviderAdapter, ResolvedRequest};
use crate::config::{ClientDefaults, Settings};
use crate::error::Result;
use crate::factory::ProviderKind;
use crate::providers::ProviderDescriptor;
use crate::traits::{CompletionRequest, HttpTransport};
use crate::transport::TransportSlot;

/// Chat client bound to one provider.
#[derive(Debug)]
pub struct ChatClient {
    kind: ProviderKind,
    defaults: ClientDefaults,
    adapter: ProviderAdapter,
}

impl ChatClient {
    /// Client configured from [`Settings::load`] with default options.
    pub fn new(kind: ProviderKind) -> Result<Self> {
        Self::from_settings(kind, &Settings::load()?, ClientDefaults::default())
    }

    /// Client using the `reqwest` transport.
    pub fn from_settings(
        kind: ProviderKind,
        settings: &Settings,
        defaults: ClientDefaults,
    ) -> Result<Self> {
        let transport = TransportSlot::reqwest(defaults.timeout);
        Self::build(kind, settings, defaults, transport)
    }

    /// Client sending every request through `transport`.
    pub fn with_transport(
        kind: ProviderKind,
        settings: &Settings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Self::build(
            kind,
            settings,
            ClientDefaults::default(),
            TransportSlot::fixed(transport),
        )
    }

    fn build(
        kind: ProviderKind,
        settings: &Settings,
        defaults: ClientDefaults,
        transport: TransportSlot,
    ) -> Result<Self> {
        let descriptor = kind.descriptor();
        let credentials = settings.credentials(descriptor)?;
        Ok(Self {
            kind,
            defaults,
            adapter: ProviderAdapter::new(descriptor, credentials, transport)?,
        })
    }

    /// Replace the defaults. The transport timeout is fixed at construction.
    pub fn with_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        self.adapter.descriptor()
    }

    pub fn defaults(&self) -> &ClientDefaults {
        &self.defaults
    }

    /// Fill unset fields: request, then client defaults, then provider defaults.
    pub fn resolve(&self, request: CompletionRequest) -> ResolvedRequest {
        let descriptor = self.descriptor();
        ResolvedRequest {
            messages: request.messages,
            model: request
                .model
                .or_else(|| self.defaults.model.clone())
                .unwrap_or_else(|| descriptor.default_model.to_string()),
            stream: request.stream.unwrap_or(self.defaults.stream),
            temperature: request.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: request
                .max_tokens
                .or(self.defaults.max_tokens)
                .unwrap_or(descriptor.default_max_tokens),
            tools: request.tools,
            tool_choice: request
                .tool_choice
                .unwrap_or_else(|| self.defaults.tool_choice.clone()),
        }
    }

    /// Run one completion.
    ///
    /// Errors raised before the first event (unknown model, HTTP status,
    /// connection failure) fail the call. Later failures arrive as the last
    /// item of the stream.
    pub async fn completion(&self, request: CompletionRequest) -> Result<Completion> {
        self.adapter.completion(self.resolve(request)).await
    }

    /// Release the HTTP client. A later call opens a new one.
    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }

    /// True while the HTTP client is held.
    pub async fn is_connected(&self) -> bool {
        self.adapter.transport_acquired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::traits::ChatMessage;
    use crate::transport::MockTransport;
    use serial_test::serial;

    fn settings() -> Settings {
        Settings::default()
            .with("minimax_api_key", "mm")
            .with("mistral_api_key", "ms")
            .with("zhipuai_api_key", "zp")
    }

    fn client(kind: ProviderKind) -> ChatClient {
        ChatClient::with_transport(kind, &settings(), Arc::new(MockTransport::new())).unwrap()
    }

    #[test]
    #[serial]
    fn test_resolve_uses_provider_defaults() {
        let client = client(ProviderKind::ZhiPuAi);
        let resolved = client.resolve(CompletionRequest::new(vec![ChatMessage::user("hi")]));
        assert_eq!(resolved.model, "glm-4-air");
        assert_eq!(resolved.max_tokens, 2048);
        assert!(resolved.stream);
        assert_eq!(resolved.temperature, 0.7);
        assert_eq!(resolved.tool_choice, "auto");
    }

    #[test]
    #[serial]
    fn test_resolve_precedence() {
        let client = client(ProviderKind::Mistral).with_defaults(
            ClientDefaults::default()
                .with_model("mistral-large")
                .with_stream(false)
                .with_temperature(0.2),
        );

        let resolved = client.resolve(CompletionRequest::new(vec![]));
        assert_eq!(resolved.model, "mistral-large");
        assert!(!resolved.stream);
        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.max_tokens, 2000);

        let resolved = client.resolve(
            CompletionRequest::new(vec![])
                .with_model("mistral-medium")
                .with_stream(true)
                .with_max_tokens(64)
                .with_tool_choice("none"),
        );
        assert_eq!(resolved.model, "mistral-medium");
        assert!(resolved.stream);
        assert_eq!(resolved.max_tokens, 64);
        assert_eq!(resolved.tool_choice, "none");
    }

    #[test]
    #[serial]
    fn test_missing_credentials_is_config_error() {
        std::env::remove_var("MINIMAX_API_KEY");
        let err = ChatClient::with_transport(
            ProviderKind::MiniMax,
            &Settings::default(),
            Arc::new(MockTransport::new()),
        )
        .unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_lazy_connection() {
        let client = ChatClient::from_settings(
            ProviderKind::Mistral,
            &settings(),
            ClientDefaults::default(),
        )
        .unwrap();
        assert_eq!(client.kind(), ProviderKind::Mistral);
        assert!(!client.is_connected().await);
        client.shutdown().await;
        assert!(!client.is_connected().await);
    }
}

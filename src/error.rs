//! Error types for the completion layer.
//!
//! # Error Taxonomy
//!
//! | Error | Raised when | Reaches caller |
//! |-------|-------------|----------------|
//! | `ConfigError` | API key or base URL missing | before any request |
//! | `UnknownModel` | model not in the provider table | before any request |
//! | `InvalidRequest` | nothing left to send after truncation | before any request |
//! | `NetworkError` / `Timeout` | transport failure | synchronously, or as the last stream item |
//! | `ProviderError` | vendor answered non-2xx | synchronously |
//! | `MalformedStreamChunk` | undecodable stream line | never: logged and skipped |
//! | `ToolParseError` | emulated tool block is malformed | never: text surfaced without tool calls |
//!
//! This layer performs no retries. Transport errors propagate unchanged.

use thiserror::Error;

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to a provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or invalid configuration (credentials, base URL, settings file).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Model is not in the provider's capability table.
    #[error("Unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    /// Request cannot be issued as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection failure or broken stream.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request exceeded the transport timeout.
    #[error("Request timed out")]
    Timeout,

    /// Vendor responded with a non-2xx status.
    #[error("Provider error {status}: {body}")]
    ProviderError { status: u16, body: String },

    /// A streamed payload could not be decoded.
    #[error("Malformed stream chunk: {0}")]
    MalformedStreamChunk(String),

    /// An emulated tool-call block was found but could not be parsed.
    #[error("Tool call parse error: {0}")]
    ToolParseError(String),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::NetworkError(format!("Connection failed: {}", err))
        } else {
            LlmError::NetworkError(err.to_string())
        }
    }
}

impl LlmError {
    /// Build an [`LlmError::UnknownModel`].
    pub fn unknown_model(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::UnknownModel {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// True for failures raised by the transport (connection, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout)
    }

    /// HTTP status carried by a [`LlmError::ProviderError`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

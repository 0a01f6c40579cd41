//! Provider selection by name.
//!
//! | Name (case-insensitive) | Kind | Descriptor |
//! |-------------------------|------|------------|
//! | `minimax` | [`ProviderKind::MiniMax`] | [`MINIMAX`] |
//! | `mistral`, `mistralai`, `mistral-ai` | [`ProviderKind::Mistral`] | [`MISTRAL`] |
//! | `zhipuai`, `zhipu`, `glm` | [`ProviderKind::ZhiPuAi`] | [`ZHIPUAI`] |
//!
//! # Example
//!
//! ```rust
//! use unichat_llm::ProviderKind;
//!
//! let kind = ProviderKind::from_str("Mistral").unwrap();
//! assert_eq!(kind.descriptor().default_model, "mistral-small");
//! ```

use crate::error::{LlmError, Result};
use crate::providers::{ProviderDescriptor, MINIMAX, MISTRAL, ZHIPUAI};

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    MiniMax,
    Mistral,
    ZhiPuAi,
}

impl ProviderKind {
    /// Parse a provider name (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "minimax" => Some(Self::MiniMax),
            "mistral" | "mistralai" | "mistral-ai" => Some(Self::Mistral),
            "zhipuai" | "zhipu" | "glm" => Some(Self::ZhiPuAi),
            _ => None,
        }
    }

    /// Parse a provider name, failing with a configuration error.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| {
            LlmError::ConfigError(format!(
                "Unknown provider '{}'. Valid providers: minimax, mistral, zhipuai",
                s
            ))
        })
    }

    /// Static description of this provider.
    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        match self {
            Self::MiniMax => &MINIMAX,
            Self::Mistral => &MISTRAL,
            Self::ZhiPuAi => &ZHIPUAI,
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn all() -> &'static [ProviderKind] {
        &[Self::MiniMax, Self::Mistral, Self::ZhiPuAi]
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("minimax"), Some(ProviderKind::MiniMax));
        assert_eq!(ProviderKind::from_str("MISTRAL"), Some(ProviderKind::Mistral));
        assert_eq!(ProviderKind::from_str("mistral-ai"), Some(ProviderKind::Mistral));
        assert_eq!(ProviderKind::from_str("glm"), Some(ProviderKind::ZhiPuAi));
        assert_eq!(ProviderKind::from_str(" ZhiPuAI "), Some(ProviderKind::ZhiPuAi));
        assert_eq!(ProviderKind::from_str("openai"), None);
    }

    #[test]
    fn test_parse_error_lists_providers() {
        let err = ProviderKind::parse("bogus").unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(_)));
        assert!(err.to_string().contains("minimax, mistral, zhipuai"));
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ProviderKind::all() {
            assert_eq!(ProviderKind::from_str(kind.name()), Some(*kind));
            assert_eq!(kind.to_string(), kind.name());
        }
    }
}

//! Message size estimation.
//!
//! Budgets are expressed either in tokens (cl100k BPE via tiktoken) or in
//! characters (Unicode scalar values), depending on the provider.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::{LlmError, Result};
use crate::traits::ChatMessage;

/// Unit a provider's input budget is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Tokens,
    Characters,
}

/// Tokenizer for counting tokens in text.
pub struct Tokenizer {
    encoder: CoreBPE,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("encoding", &"cl100k_base").finish()
    }
}

impl Tokenizer {
    /// Create a cl100k tokenizer.
    pub fn cl100k() -> Result<Self> {
        let encoder = cl100k_base()
            .map_err(|e| LlmError::ConfigError(format!("failed to load cl100k tokenizer: {}", e)))?;
        Ok(Self { encoder })
    }

    /// Count the number of tokens in the text.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.encoder.encode_with_special_tokens(text).len()
    }
}

/// Measures messages in a provider's budget unit.
#[derive(Debug)]
pub enum SizeEstimator {
    Tokens(Tokenizer),
    Characters,
}

impl SizeEstimator {
    /// Build the estimator for a unit. Loading the BPE table is the only
    /// fallible step.
    pub fn for_unit(unit: SizeUnit) -> Result<Self> {
        match unit {
            SizeUnit::Tokens => Ok(Self::Tokens(Tokenizer::cl100k()?)),
            SizeUnit::Characters => Ok(Self::Characters),
        }
    }

    /// Size of one text in this estimator's unit.
    pub fn measure(&self, text: &str) -> usize {
        match self {
            Self::Tokens(tokenizer) => tokenizer.count_tokens(text),
            Self::Characters => text.chars().count(),
        }
    }

    /// Size of one message. Only the content counts.
    pub fn message_size(&self, message: &ChatMessage) -> usize {
        self.measure(&message.content)
    }

    /// Total size of a message sequence.
    pub fn total(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.message_size(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_counting() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let text = "Hello, world!";
        let count = tokenizer.count_tokens(text);
        assert!(count > 0);
        assert!(count < text.len());
    }

    #[test]
    fn test_empty_string() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.count_tokens(""), 0);
    }

    #[test]
    fn test_characters_count_scalars_not_bytes() {
        let estimator = SizeEstimator::for_unit(SizeUnit::Characters).unwrap();
        assert_eq!(estimator.measure("héllo"), 5);
        assert_eq!(estimator.measure("<|▶|>"), 5);
    }

    #[test]
    fn test_total_sums_contents() {
        let estimator = SizeEstimator::for_unit(SizeUnit::Characters).unwrap();
        let messages = vec![ChatMessage::system("abc"), ChatMessage::user("de")];
        assert_eq!(estimator.total(&messages), 5);
    }

    #[test]
    fn test_token_estimator() {
        let estimator = SizeEstimator::for_unit(SizeUnit::Tokens).unwrap();
        let msg = ChatMessage::user("The quick brown fox jumps over the lazy dog");
        let tokens = estimator.message_size(&msg);
        assert!(tokens > 0);
        assert!(tokens < msg.content.len());
    }
}

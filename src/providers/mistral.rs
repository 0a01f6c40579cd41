//! Mistral AI (La Plateforme).
//!
//! Served through the OpenAI-compatible chat endpoint. `mistral-medium` has no
//! native function calling, so tool use for it goes through the text protocol
//! in [`crate::tool_protocol`]. Input budgets are counted in characters, and
//! generated text has `\_` unescaped.

use super::{EndpointShape, ModelSpec, ProviderDescriptor};
use crate::tokenizer::SizeUnit;

const MODELS: &[ModelSpec] = &[
    ModelSpec::new("mixtral-8x22b", "open-mixtral-8x22b", 60000, true),
    ModelSpec::new("mistral-small", "mistral-small-latest", 30000, true),
    ModelSpec::new("mistral-medium", "mistral-medium-latest", 30000, false),
    ModelSpec::new("mistral-large", "mistral-large-latest", 30000, true),
];

pub static MISTRAL: ProviderDescriptor = ProviderDescriptor {
    name: "mistral",
    default_model: "mistral-small",
    models: MODELS,
    api_key_setting: "mistral_api_key",
    api_base_setting: "mistral_api_base",
    default_api_base: Some("https://api.mistral.ai/v1"),
    endpoint: EndpointShape::OpenAiChat,
    size_unit: SizeUnit::Characters,
    default_max_tokens: 2000,
    unescape_underscores: true,
};

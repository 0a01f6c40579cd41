//! ZhiPuAI GLM models over the OpenAI-compatible endpoint.

use super::{EndpointShape, ModelSpec, ProviderDescriptor};
use crate::tokenizer::SizeUnit;

const MODELS: &[ModelSpec] = &[
    ModelSpec::new("glm-3-turbo", "glm-3-turbo", 128000, true),
    ModelSpec::new("glm-4", "glm-4", 128000, true),
    ModelSpec::new("glm-4-0520", "glm-4-0520", 128000, true),
    ModelSpec::new("glm-4-air", "glm-4-air", 128000, true),
    ModelSpec::new("glm-4-airx", "glm-4-airx", 128000, true),
    ModelSpec::new("glm-4-flash", "glm-4-flash", 128000, true),
    // Vision model, no function calling.
    ModelSpec::new("glm-4v", "glm-4v", 2000, false),
];

pub static ZHIPUAI: ProviderDescriptor = ProviderDescriptor {
    name: "zhipuai",
    default_model: "glm-4-air",
    models: MODELS,
    api_key_setting: "zhipuai_api_key",
    api_base_setting: "zhipuai_api_base",
    default_api_base: Some("https://open.bigmodel.cn/api/paas/v4"),
    endpoint: EndpointShape::OpenAiChat,
    size_unit: SizeUnit::Tokens,
    default_max_tokens: 2048,
    unescape_underscores: false,
};

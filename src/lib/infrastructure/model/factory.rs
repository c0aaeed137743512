//! Provider factory - creates clients from config

use super::clients::{AnthropicClient, OllamaClient, OpenAIClient};
use super::traits::ModelClient;
use crate::config::ModelProviderConfig;
use std::env;
use tracing::warn;

/// Wire format a provider type speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    /// OpenAI chat completions with server-sent-event deltas
    OpenAIStreaming,
    /// OpenAI chat completions, single answer
    OpenAI,
    Ollama,
    Anthropic,
}

/// Infer API format from provider type string. None for unknown types.
pub fn infer_api_format(provider_type: &str) -> Option<ApiFormat> {
    let format = match provider_type.to_lowercase().as_str() {
        "openai" | "deepseek" | "vllm" | "zhipu" | "bytedance" => ApiFormat::OpenAIStreaming,
        "lmstudio" => ApiFormat::OpenAI,
        "ollama" | "localai" => ApiFormat::Ollama,
        "anthropic" | "claude" => ApiFormat::Anthropic,
        _ => return None,
    };
    Some(format)
}

/// Resolve API key from environment variable
pub fn resolve_api_key(provider: &str, spec: Option<&str>) -> Option<String> {
    let Some(raw) = spec.map(str::trim) else {
        return None;
    };
    if raw.is_empty() {
        return None;
    }
    match env::var(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                provider,
                env_var = raw,
                %err,
                "API key environment variable is not set"
            );
            None
        }
    }
}

/// Factory for creating model clients from provider config.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a model client based on provider type.
    ///
    /// - `openai`, `deepseek`, `vllm`, `zhipu`, `bytedance` → incremental OpenAI format
    /// - `ollama`, `localai` → Ollama format
    /// - `anthropic`, `claude` → Anthropic messages format
    /// - `lmstudio` → single-answer OpenAI format
    ///
    /// Unknown types get no client.
    pub fn create(config: &ModelProviderConfig) -> Option<Box<dyn ModelClient>> {
        let client: Box<dyn ModelClient> = match infer_api_format(&config.provider_type)? {
            ApiFormat::OpenAIStreaming => {
                Box::new(OpenAIClient::from_config(config).with_streaming(true))
            }
            ApiFormat::OpenAI => Box::new(OpenAIClient::from_config(config)),
            ApiFormat::Ollama => Box::new(OllamaClient::from_config(config)),
            ApiFormat::Anthropic => Box::new(AnthropicClient::from_config(config)),
        };
        Some(client)
    }
}

//! Model types - Request, Result, and Error types

use crate::domain::tool::FunctionDefinition;
use crate::domain::types::{ChatMessage, ToolCallRequest};
use futures::stream::BoxStream;
use reqwest::StatusCode;
use thiserror::Error;

/// Which backend and model a generation call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Configured provider id the dispatcher routes on.
    pub provider: String,
    pub model: String,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Model request for LLM chat
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub functions: Vec<FunctionDefinition>,
}

/// Assistant text and proposed tool calls, either settled or one partial chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl GenerationResult {
    pub fn new(assistant_text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            assistant_text: assistant_text.into(),
            tool_calls,
        }
    }

    pub fn text(assistant_text: impl Into<String>) -> Self {
        Self::new(assistant_text, Vec::new())
    }

    /// Folds a later chunk into this one.
    pub fn absorb(&mut self, chunk: GenerationResult) {
        self.assistant_text.push_str(&chunk.assistant_text);
        self.tool_calls.extend(chunk.tool_calls);
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Finite, single-pass sequence of generation chunks.
pub type GenerationStream = BoxStream<'static, Result<GenerationResult, ModelError>>;

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider '{provider}' is not configured")]
    ProviderNotFound { provider: String },
    #[error("model '{model}' is not available for provider '{provider}'")]
    ModelNotFound { provider: String, model: String },
    #[error("provider '{provider}' requires an API key")]
    MissingApiKey { provider: String },
    #[error("network error calling provider '{provider}': {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider '{provider}' returned invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
    #[error("provider '{provider}' does not produce incremental output")]
    StreamingUnsupported { provider: String },
    #[error("stream from provider '{provider}' failed: {message}")]
    Stream { provider: String, message: String },
}

impl ModelError {
    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            provider: provider.into(),
        }
    }

    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn stream(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Stream {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Short message suitable for printing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            ModelError::ProviderNotFound { provider } => {
                format!("Model provider '{provider}' is not configured. Check client.toml.")
            }
            ModelError::ModelNotFound { provider, model } => {
                format!("Model '{model}' is not available from provider '{provider}'.")
            }
            ModelError::MissingApiKey { provider } => {
                format!("Provider '{provider}' needs an API key.")
            }
            ModelError::Network { provider, source } => {
                if source.is_connect() {
                    format!("Cannot connect to model provider '{provider}'.")
                } else if source.is_timeout() {
                    format!("Request to '{provider}' timed out.")
                } else if let Some(status) = source.status() {
                    match status {
                        StatusCode::NOT_FOUND => format!("Endpoint of '{provider}' not found."),
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            format!("Provider '{provider}' is unavailable.")
                        }
                        _ => format!("Request to '{provider}' failed: {}", status.as_u16()),
                    }
                } else {
                    format!("Network error talking to '{provider}'.")
                }
            }
            ModelError::InvalidResponse { provider, .. } => {
                format!("Response from '{provider}' was not understood.")
            }
            ModelError::StreamingUnsupported { provider } => {
                format!("Provider '{provider}' cannot stream.")
            }
            ModelError::Stream { provider, .. } => {
                format!("Streaming from '{provider}' broke off.")
            }
        }
    }
}

//! # Provider Configuration
//!
//! This module defines the configuration types for generation backends.
//!
//! ## Provider Types
//!
//! | Type | Output | API Key Required |
//! |------|--------|-----------------|
//! | `openai`, `deepseek`, `vllm`, `zhipu`, `bytedance` | incremental | Yes |
//! | `lmstudio` | single completion | No |
//! | `anthropic` | single completion | Yes |
//! | `ollama` | single completion | No |

use serde::{Deserialize, Serialize};

/// Information about an available model from a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier used in API calls (e.g., "deepseek-chat")
    pub name: String,
    /// Human-readable display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Configuration for a generation backend.
///
/// # Example
///
/// ```toml
/// [[providers]]
/// id = "deepseek"
/// type = "deepseek"
/// endpoint = "https://api.deepseek.com"
/// api_key = "DEEPSEEK_API_KEY"
/// models = ["deepseek-chat"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelProviderConfig {
    /// Identifier the dispatcher routes on (e.g., "deepseek", "ollama-local")
    pub id: String,
    /// The provider type determines the API format
    #[serde(rename = "type")]
    pub provider_type: String,
    /// API endpoint URL
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API path override (e.g., "/v1/chat/completions")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    /// List of available models from this provider
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawProviderConfig {
    pub(super) id: String,
    #[serde(rename = "type", default)]
    pub(super) provider_type: String,
    pub(super) endpoint: Option<String>,
    pub(super) api_key: Option<String>,
    #[serde(default)]
    pub(super) api_path: Option<String>,
    #[serde(default)]
    pub(super) models: Vec<RawModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawModelInfo {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        display_name: Option<String>,
    },
}

impl From<RawModelInfo> for ModelInfo {
    fn from(value: RawModelInfo) -> Self {
        match value {
            RawModelInfo::Name(name) => Self {
                name,
                display_name: None,
            },
            RawModelInfo::Detailed { name, display_name } => Self { name, display_name },
        }
    }
}

impl From<RawProviderConfig> for ModelProviderConfig {
    fn from(raw: RawProviderConfig) -> Self {
        // `type` defaults to the id, so `id = "ollama"` alone is enough
        let provider_type = if raw.provider_type.trim().is_empty() {
            raw.id.clone()
        } else {
            raw.provider_type
        };

        Self {
            id: raw.id,
            provider_type,
            endpoint: raw.endpoint.unwrap_or_default(),
            api_key: raw.api_key,
            api_path: raw.api_path,
            models: raw.models.into_iter().map(ModelInfo::from).collect(),
        }
    }
}

impl ModelProviderConfig {
    pub fn new(
        id: impl Into<String>,
        provider_type: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_type: provider_type.into(),
            endpoint: endpoint.into(),
            api_key: None,
            api_path: None,
            models: Vec::new(),
        }
    }

    /// Ensure a model exists in this provider's model list
    pub fn ensure_model(&mut self, model: &str) {
        if self.models.iter().all(|info| info.name != model) {
            self.models.push(ModelInfo {
                name: model.to_string(),
                display_name: None,
            });
        }
    }
}

//! Anthropic messages API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::base::HttpClientBase;
use crate::config::ModelProviderConfig;
use crate::constants::DEFAULT_ANTHROPIC_API_PATH;
use crate::infrastructure::model::adapter::{MessageAdapter, tool_call_from_parts};
use crate::infrastructure::model::factory::resolve_api_key;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{GenerationResult, ModelError, ModelRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic client. Answers arrive as a single completion.
#[derive(Clone)]
pub struct AnthropicClient {
    base: HttpClientBase,
    api_path: String,
}

impl AnthropicClient {
    pub fn from_config(config: &ModelProviderConfig) -> Self {
        let api_key = resolve_api_key(&config.id, config.api_key.as_deref());
        Self {
            base: HttpClientBase::new(config.id.clone(), config.endpoint.clone(), api_key),
            api_path: config
                .api_path
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_PATH.to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn chat(&self, request: ModelRequest) -> Result<GenerationResult, ModelError> {
        let api_key = self.base.require_api_key()?;
        let url = self.base.build_url(&self.api_path);
        let (system, messages) = MessageAdapter::to_anthropic_format(&request.messages);

        let payload = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: MAX_TOKENS,
            system,
            messages,
            tools: MessageAdapter::to_anthropic_tools(&request.functions),
        };

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            "Sending request to Anthropic"
        );

        let headers = [("x-api-key", api_key), ("anthropic-version", ANTHROPIC_VERSION)];
        let response: AnthropicResponse = self
            .base
            .post_with_headers(&url, &headers, &payload)
            .await?;
        debug!(blocks = response.content.len(), "Received response from Anthropic");

        Ok(collect_blocks(response.content))
    }
}

fn collect_blocks(blocks: Vec<ContentBlock>) -> GenerationResult {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: part } => text.push_str(&part),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(tool_call_from_parts(Some(id), name, &input));
            }
            ContentBlock::Other => {}
        }
    }
    GenerationResult::new(text, tool_calls)
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

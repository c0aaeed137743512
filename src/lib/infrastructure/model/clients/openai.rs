//! OpenAI-compatible client implementation

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Error as EventSourceError, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::base::HttpClientBase;
use crate::config::ModelProviderConfig;
use crate::constants::DEFAULT_OPENAI_API_PATH;
use crate::infrastructure::model::adapter::{MessageAdapter, ensure_call_id, tool_call_from_parts};
use crate::infrastructure::model::factory::resolve_api_key;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{
    GenerationResult, GenerationStream, ModelError, ModelRequest,
};
use crate::domain::types::ToolCallRequest;

const DONE_MARKER: &str = "[DONE]";

/// OpenAI-compatible client (OpenAI, DeepSeek, vLLM, Zhipu, ByteDance, LM Studio)
#[derive(Clone)]
pub struct OpenAIClient {
    base: HttpClientBase,
    api_path: String,
    requires_key: bool,
    streaming: bool,
}

impl OpenAIClient {
    pub fn from_config(config: &ModelProviderConfig) -> Self {
        let api_key = resolve_api_key(&config.id, config.api_key.as_deref());
        Self {
            base: HttpClientBase::new(config.id.clone(), config.endpoint.clone(), api_key),
            api_path: config
                .api_path
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_API_PATH.to_string()),
            requires_key: config.api_key.is_some(),
            streaming: false,
        }
    }

    /// Enable incremental output through server-sent events.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn payload(&self, request: &ModelRequest, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: request.model.clone(),
            messages: MessageAdapter::to_openai_format(&request.messages),
            stream,
            tools: MessageAdapter::to_openai_tools(&request.functions),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn chat(&self, request: ModelRequest) -> Result<GenerationResult, ModelError> {
        let url = self.base.build_url(&self.api_path);
        let payload = self.payload(&request, false);

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            functions = request.functions.len(),
            "Sending request to OpenAI-compatible provider"
        );

        let response: OpenAIResponse = if self.requires_key {
            self.base.post_with_bearer(&url, &payload).await?
        } else {
            self.base.post_no_auth(&url, &payload).await?
        };
        debug!("Received response from OpenAI-compatible provider");

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .ok_or_else(|| ModelError::invalid_response(&self.base.id, "missing message"))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| tool_call_from_parts(call.id, call.function.name, &call.function.arguments))
            .collect();
        Ok(GenerationResult::new(
            message.content.unwrap_or_default(),
            tool_calls,
        ))
    }

    async fn chat_stream(&self, request: ModelRequest) -> Result<GenerationStream, ModelError> {
        if !self.streaming {
            return Err(ModelError::StreamingUnsupported {
                provider: self.base.id.clone(),
            });
        }
        let url = self.base.build_url(&self.api_path);
        let payload = self.payload(&request, true);
        let mut source = self.base.event_source(&url, &payload, self.requires_key)?;

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            "Streaming from OpenAI-compatible provider"
        );

        let provider = self.base.id.clone();
        let (tx, rx) = mpsc::channel::<Result<GenerationResult, ModelError>>(32);
        tokio::spawn(async move {
            let mut accumulator = StreamAccumulator::default();
            while let Some(event) = source.next().await {
                let message = match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => message,
                    Err(EventSourceError::StreamEnded) => break,
                    Err(err) => {
                        warn!(provider = provider.as_str(), %err, "model stream failed");
                        let _ = tx.send(Err(ModelError::stream(&provider, err))).await;
                        source.close();
                        return;
                    }
                };
                if message.data.trim() == DONE_MARKER {
                    break;
                }
                let chunk: Value = match serde_json::from_str(&message.data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        debug!(provider = provider.as_str(), %err, "skipping unparseable chunk");
                        continue;
                    }
                };
                for partial in accumulator.push(&chunk) {
                    if tx.send(Ok(partial)).await.is_err() {
                        source.close();
                        return;
                    }
                }
            }
            source.close();
            if let Some(last) = accumulator.finish() {
                let _ = tx.send(Ok(last)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Turns chat-completion deltas into chunks: one per text delta, and one
/// carrying every tool call once the choice finishes.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    calls: BTreeMap<u64, PartialCall>,
    flushed: bool,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl StreamAccumulator {
    pub(crate) fn push(&mut self, chunk: &Value) -> Vec<GenerationResult> {
        let mut out = Vec::new();
        let Some(choices) = chunk.get("choices").and_then(Value::as_array) else {
            return out;
        };
        for choice in choices {
            let delta = choice.get("delta").unwrap_or(&Value::Null);
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    out.push(GenerationResult::text(text));
                }
            }
            if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
                for (position, fragment) in fragments.iter().enumerate() {
                    let index = fragment
                        .get("index")
                        .and_then(Value::as_u64)
                        .unwrap_or(position as u64);
                    let entry = self.calls.entry(index).or_default();
                    if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                        entry.id = Some(id.to_string());
                    }
                    let function = fragment.get("function").unwrap_or(&Value::Null);
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        entry.name.push_str(name);
                    }
                    if let Some(arguments) = function.get("arguments").and_then(Value::as_str) {
                        entry.arguments.push_str(arguments);
                    }
                }
            }
            let finished = choice
                .get("finish_reason")
                .is_some_and(|reason| !reason.is_null());
            if finished {
                out.extend(self.finish());
            }
        }
        out
    }

    /// Emits accumulated tool calls once. Later calls return None.
    pub(crate) fn finish(&mut self) -> Option<GenerationResult> {
        if self.flushed || self.calls.is_empty() {
            return None;
        }
        self.flushed = true;
        let tool_calls: Vec<ToolCallRequest> = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                };
                ToolCallRequest::new(ensure_call_id(call.id), call.name, arguments)
            })
            .collect();
        Some(GenerationResult::new(String::new(), tool_calls))
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OpenAIFunctionCall,
}

#[derive(Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

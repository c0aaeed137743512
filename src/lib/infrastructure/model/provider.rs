//! Generation dispatcher over multiple backends

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::factory::ProviderFactory;
use super::traits::ModelClient;
use super::types::{GenerationResult, GenerationStream, ModelConfig, ModelError, ModelRequest};
use crate::config::ModelProviderConfig;
use crate::domain::tool::FunctionDefinition;
use crate::domain::types::ChatMessage;

/// Runtime container for a provider backend
struct ProviderRuntime {
    models: HashSet<String>,
    client: Box<dyn ModelClient>,
}

impl ProviderRuntime {
    fn supports(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.contains(model)
    }
}

/// Routes a conversation to the configured backend and hands every answer
/// back as a finite stream of chunks, whatever the backend's style.
#[derive(Default)]
pub struct GenerationDispatcher {
    backends: HashMap<String, ProviderRuntime>,
}

impl GenerationDispatcher {
    /// Create dispatcher from config list using factory
    pub fn from_configs(configs: &[ModelProviderConfig]) -> Self {
        let mut dispatcher = Self::default();
        for config in configs {
            let Some(client) = ProviderFactory::create(config) else {
                warn!(
                    provider = config.id.as_str(),
                    provider_type = config.provider_type.as_str(),
                    "unknown provider type; requests to it get a placeholder answer"
                );
                continue;
            };
            let models = config.models.iter().map(|m| m.name.clone()).collect();
            dispatcher
                .backends
                .insert(config.id.clone(), ProviderRuntime { models, client });
        }
        dispatcher
    }

    /// Registers a client under `provider`. An empty model list accepts any model.
    pub fn with_client<C>(mut self, provider: impl Into<String>, models: &[&str], client: C) -> Self
    where
        C: ModelClient + 'static,
    {
        self.backends.insert(
            provider.into(),
            ProviderRuntime {
                models: models.iter().map(|m| m.to_string()).collect(),
                client: Box::new(client),
            },
        );
        self
    }

    /// Runs one generation. The returned stream is single-pass and finite:
    /// incremental backends yield their partial chunks, everything else
    /// (batch backends, non-streaming mode, unknown providers) yields exactly
    /// one chunk.
    pub async fn generate(
        &self,
        conversation: &[ChatMessage],
        config: &ModelConfig,
        functions: &[FunctionDefinition],
        stream: bool,
    ) -> Result<GenerationStream, ModelError> {
        let Some(runtime) = self.backends.get(&config.provider) else {
            warn!(provider = config.provider.as_str(), stream, "unsupported provider");
            return Ok(single(unsupported(&config.provider, stream)));
        };
        if !runtime.supports(&config.model) {
            return Err(ModelError::model_not_found(&config.provider, &config.model));
        }

        let request = ModelRequest {
            provider: config.provider.clone(),
            model: config.model.clone(),
            messages: conversation.to_vec(),
            functions: functions.to_vec(),
        };

        if stream && runtime.client.supports_streaming() {
            debug!(provider = config.provider.as_str(), "dispatching incremental generation");
            return runtime.client.chat_stream(request).await;
        }

        debug!(provider = config.provider.as_str(), stream, "dispatching single generation");
        let result = runtime.client.chat(request).await?;
        Ok(single(result))
    }

    /// Non-streaming convenience: the settled result of one generation.
    pub async fn complete(
        &self,
        conversation: &[ChatMessage],
        config: &ModelConfig,
        functions: &[FunctionDefinition],
    ) -> Result<GenerationResult, ModelError> {
        let chunks = self.generate(conversation, config, functions, false).await?;
        collect(chunks, |_| {}).await
    }
}

/// Drains a generation stream into one settled result, handing every text
/// fragment to `on_text` as it arrives.
pub async fn collect<F>(mut chunks: GenerationStream, mut on_text: F) -> Result<GenerationResult, ModelError>
where
    F: FnMut(&str),
{
    let mut settled = GenerationResult::default();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if !chunk.assistant_text.is_empty() {
            on_text(&chunk.assistant_text);
        }
        settled.absorb(chunk);
    }
    Ok(settled)
}

fn single(result: GenerationResult) -> GenerationStream {
    Box::pin(stream::iter([Ok::<_, ModelError>(result)]))
}

fn unsupported(provider: &str, stream: bool) -> GenerationResult {
    if stream {
        GenerationResult::text(format!("Unsupported streaming provider '{provider}'"))
    } else {
        GenerationResult::text(format!("Unsupported provider '{provider}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{MessageRole, ToolCallRequest};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BatchClient {
        answer: GenerationResult,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelClient for BatchClient {
        fn id(&self) -> &str {
            "batch"
        }

        async fn chat(&self, _request: ModelRequest) -> Result<GenerationResult, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    struct IncrementalClient;

    #[async_trait]
    impl ModelClient for IncrementalClient {
        fn id(&self) -> &str {
            "incremental"
        }

        fn supports_streaming(&self) -> bool {
            true
        }

        async fn chat(&self, _request: ModelRequest) -> Result<GenerationResult, ModelError> {
            Ok(GenerationResult::text("settled"))
        }

        async fn chat_stream(&self, _request: ModelRequest) -> Result<GenerationStream, ModelError> {
            let chunks: Vec<Result<GenerationResult, ModelError>> = vec![
                Ok(GenerationResult::text("par")),
                Ok(GenerationResult::text("tial")),
                Ok(GenerationResult::new(
                    "",
                    vec![ToolCallRequest::new("c1", "cost_estimate", "{}")],
                )),
            ];
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![ChatMessage::new(MessageRole::User, "price 3 m3 of concrete")]
    }

    fn batch_answer() -> GenerationResult {
        GenerationResult::new(
            "Let me check.",
            vec![ToolCallRequest::new("c1", "cost_estimate", r#"{"quantity":3}"#)],
        )
    }

    #[tokio::test]
    async fn batch_backend_streams_exactly_one_chunk_equal_to_settled_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = GenerationDispatcher::default().with_client(
            "local",
            &[],
            BatchClient {
                answer: batch_answer(),
                calls: calls.clone(),
            },
        );
        let config = ModelConfig::new("local", "llama3");

        let settled = dispatcher
            .complete(&conversation(), &config, &[])
            .await
            .expect("settled");
        let chunks: Vec<_> = dispatcher
            .generate(&conversation(), &config, &[], true)
            .await
            .expect("stream")
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().expect("chunk"), &settled);
        assert_eq!(settled, batch_answer());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn incremental_backend_yields_partial_chunks() {
        let dispatcher = GenerationDispatcher::default().with_client("oa", &[], IncrementalClient);
        let config = ModelConfig::new("oa", "gpt");

        let stream = dispatcher
            .generate(&conversation(), &config, &[], true)
            .await
            .expect("stream");
        let mut seen = Vec::new();
        let settled = collect(stream, |text| seen.push(text.to_string()))
            .await
            .expect("collected");

        assert_eq!(seen, vec!["par", "tial"]);
        assert_eq!(settled.assistant_text, "partial");
        assert_eq!(settled.tool_calls.len(), 1);

        let batch = dispatcher
            .complete(&conversation(), &config, &[])
            .await
            .expect("settled");
        assert_eq!(batch.assistant_text, "settled");
    }

    #[tokio::test]
    async fn unknown_provider_degrades_to_placeholder_in_both_modes() {
        let dispatcher = GenerationDispatcher::default();
        let config = ModelConfig::new("mystery", "m");

        let settled = dispatcher
            .complete(&conversation(), &config, &[])
            .await
            .expect("placeholder");
        assert_eq!(settled.assistant_text, "Unsupported provider 'mystery'");
        assert!(!settled.has_tool_calls());

        let chunks: Vec<_> = dispatcher
            .generate(&conversation(), &config, &[], true)
            .await
            .expect("placeholder stream")
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().expect("chunk").assistant_text,
            "Unsupported streaming provider 'mystery'"
        );
    }

    #[tokio::test]
    async fn provider_of_unknown_type_answers_with_placeholder() {
        let configs = vec![ModelProviderConfig::new("gem", "gemini", "https://example.invalid")];
        let dispatcher = GenerationDispatcher::from_configs(&configs);

        let settled = dispatcher
            .complete(&conversation(), &ModelConfig::new("gem", "gemini-pro"), &[])
            .await
            .expect("placeholder");
        assert_eq!(settled.assistant_text, "Unsupported provider 'gem'");
    }

    #[tokio::test]
    async fn unlisted_model_is_rejected() {
        let dispatcher = GenerationDispatcher::default().with_client(
            "local",
            &["llama3"],
            BatchClient {
                answer: batch_answer(),
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );
        let result = dispatcher
            .complete(&conversation(), &ModelConfig::new("local", "mistral"), &[])
            .await;
        assert!(matches!(result, Err(ModelError::ModelNotFound { .. })));
    }
}

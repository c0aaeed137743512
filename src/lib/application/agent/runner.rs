use super::errors::AgentError;
use super::models::{AgentOptions, AgentOutcome, AgentStep};
use crate::application::tooling::ToolCallRouter;
use crate::domain::types::Conversation;
use crate::infrastructure::model::{GenerationDispatcher, ModelConfig, collect};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives assistant text fragments as they are generated.
pub type TextObserver = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Agent {
    dispatcher: Arc<GenerationDispatcher>,
    router: Arc<ToolCallRouter>,
    defaults: ModelConfig,
    observer: Option<TextObserver>,
}

impl Agent {
    pub fn new(
        dispatcher: Arc<GenerationDispatcher>,
        router: Arc<ToolCallRouter>,
        defaults: ModelConfig,
    ) -> Self {
        Self {
            dispatcher,
            router,
            defaults,
            observer: None,
        }
    }

    pub fn with_text_observer(mut self, observer: TextObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn run(
        &self,
        prompt: impl Into<String>,
        options: AgentOptions,
    ) -> Result<AgentOutcome, AgentError> {
        let config = ModelConfig::new(
            options
                .provider
                .clone()
                .unwrap_or_else(|| self.defaults.provider.clone()),
            options
                .model
                .clone()
                .unwrap_or_else(|| self.defaults.model.clone()),
        );
        info!(
            provider = config.provider.as_str(),
            model = config.model.as_str(),
            stream = options.stream,
            "Agent run started"
        );

        let mut conversation = Conversation::with_system(self.system_prompt(&options).await);
        conversation.push_user(prompt);
        let mut steps = Vec::new();
        let max_turns = options.max_turns.max(1);

        for turn in 1..=max_turns {
            let functions = self.router.registry().function_catalogue().await;
            debug!(turn, functions = functions.len(), "Submitting agent turn to model provider");

            let chunks = self
                .dispatcher
                .generate(conversation.messages(), &config, &functions, options.stream)
                .await?;
            let result = collect(chunks, |text| {
                if let Some(observer) = &self.observer {
                    observer(text);
                }
            })
            .await?;

            conversation.push_assistant(result.assistant_text.clone(), result.tool_calls.clone());
            if !result.has_tool_calls() {
                info!(turn, "Agent returned final response");
                return Ok(AgentOutcome {
                    response: result.assistant_text,
                    turns: turn,
                    steps,
                    conversation,
                });
            }

            info!(turn, calls = result.tool_calls.len(), "Agent requested tool execution");
            for message in self.router.route_all(&result.tool_calls).await {
                steps.push(AgentStep {
                    turn,
                    call_id: message.tool_call_id.clone().unwrap_or_default(),
                    function: message.name.clone().unwrap_or_default(),
                    content: message.content.clone(),
                });
                conversation.push_tool_result(message)?;
            }
        }

        warn!(max_turns, "Agent exceeded max tool interactions");
        Err(AgentError::TurnLimit { max_turns })
    }

    async fn system_prompt(&self, options: &AgentOptions) -> String {
        let base = options.system_prompt.clone().unwrap_or_default();
        if !options.describe_tools {
            return base;
        }
        let listing = self.router.registry().describe_tools().await;
        if listing.trim().is_empty() {
            return base;
        }
        if base.trim().is_empty() {
            format!("Available tools:{listing}")
        } else {
            format!("{base}\n\nAvailable tools:{listing}")
        }
    }
}

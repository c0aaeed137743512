use crate::config::defaults::DEFAULT_MAX_TURNS;
use crate::domain::types::Conversation;

/// One routed tool call, as recorded in the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    pub turn: usize,
    pub call_id: String,
    pub function: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub response: String,
    pub turns: usize,
    pub steps: Vec<AgentStep>,
    pub conversation: Conversation,
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub stream: bool,
    /// Append the plain-text tool listing to the system prompt, for backends
    /// that ignore function schemas.
    pub describe_tools: bool,
    pub max_turns: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            system_prompt: None,
            stream: false,
            describe_tools: false,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

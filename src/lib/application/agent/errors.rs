use crate::domain::types::ConversationError;
use crate::infrastructure::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error("agent stopped after {max_turns} turns without a final answer")]
    TurnLimit { max_turns: usize },
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
            AgentError::Conversation(err) => format!("Conversation became inconsistent: {err}"),
            AgentError::TurnLimit { max_turns } => format!(
                "The model kept calling tools for {max_turns} turns without answering."
            ),
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A model-proposed tool call. `name` is the compound `<provider>_<tool>`
/// address and `arguments` the raw argument text exactly as the model wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            data: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Tool-result message answering the call identified by `call_id`.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            data,
            ..Self::new(MessageRole::Tool, content)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result references unknown call id '{call_id}'")]
    UnknownToolCall { call_id: String },
    #[error("tool result message is missing a tool_call_id")]
    MissingToolCallId,
}

/// Ordered, append-only message log for one agent conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    proposed_calls: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            conversation
                .messages
                .push(ChatMessage::new(MessageRole::System, prompt));
        }
        conversation
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::new(MessageRole::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) {
        for call in &tool_calls {
            self.proposed_calls.insert(call.id.clone());
        }
        self.messages
            .push(ChatMessage::assistant(content, tool_calls));
    }

    /// Appends a tool-result message. The referenced call id must have been
    /// proposed by an earlier assistant message.
    pub fn push_tool_result(&mut self, message: ChatMessage) -> Result<(), ConversationError> {
        let call_id = message
            .tool_call_id
            .as_deref()
            .ok_or(ConversationError::MissingToolCallId)?;
        if !self.proposed_calls.contains(call_id) {
            return Err(ConversationError::UnknownToolCall {
                call_id: call_id.to_string(),
            });
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

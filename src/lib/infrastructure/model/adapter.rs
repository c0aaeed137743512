//! Message adapters - convert between different API formats

use crate::domain::tool::FunctionDefinition;
use crate::domain::types::{ChatMessage, MessageRole, ToolCallRequest};
use serde_json::{Map as JsonMap, Value, json};
use uuid::Uuid;

/// Adapter for converting messages to different API formats
pub struct MessageAdapter;

impl MessageAdapter {
    /// Convert messages to OpenAI-style format, tool calls and tool results included
    pub fn to_openai_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if !msg.tool_calls.is_empty() => json!({
                    "role": "assistant",
                    "content": msg.content,
                    "tool_calls": msg
                        .tool_calls
                        .iter()
                        .map(|call| json!({
                            "id": call.id,
                            "type": "function",
                            "function": {"name": call.name, "arguments": call.arguments}
                        }))
                        .collect::<Vec<_>>(),
                }),
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                }),
                role => json!({
                    "role": role.as_str(),
                    "content": msg.content,
                }),
            })
            .collect()
    }

    /// Convert messages to Ollama format.
    /// Ollama expects tool-call arguments as objects, not strings.
    pub fn to_ollama_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if !msg.tool_calls.is_empty() => json!({
                    "role": "assistant",
                    "content": msg.content,
                    "tool_calls": msg
                        .tool_calls
                        .iter()
                        .map(|call| json!({
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(arguments_object(&call.arguments)),
                            }
                        }))
                        .collect::<Vec<_>>(),
                }),
                role => json!({
                    "role": role.as_str(),
                    "content": msg.content,
                }),
            })
            .collect()
    }

    /// Convert messages to Anthropic messages format.
    /// Returns: (system_text, messages). Consecutive tool results share one
    /// user turn.
    pub fn to_anthropic_format(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts = Vec::new();
        let mut converted: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        for message in messages {
            if message.role != MessageRole::Tool && !pending_results.is_empty() {
                converted.push(json!({
                    "role": "user",
                    "content": std::mem::take(&mut pending_results),
                }));
            }
            match message.role {
                MessageRole::System => system_parts.push(message.content.clone()),
                MessageRole::User => converted.push(json!({
                    "role": "user",
                    "content": message.content,
                })),
                MessageRole::Assistant => {
                    let mut blocks = Vec::new();
                    if !message.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": message.content}));
                    }
                    for call in &message.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": Value::Object(arguments_object(&call.arguments)),
                        }));
                    }
                    converted.push(json!({"role": "assistant", "content": blocks}));
                }
                MessageRole::Tool => pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                })),
            }
        }
        if !pending_results.is_empty() {
            converted.push(json!({"role": "user", "content": pending_results}));
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, converted)
    }

    pub fn to_openai_tools(functions: &[FunctionDefinition]) -> Vec<Value> {
        functions.iter().map(FunctionDefinition::to_openai_tool).collect()
    }

    pub fn to_anthropic_tools(functions: &[FunctionDefinition]) -> Vec<Value> {
        functions
            .iter()
            .map(|function| {
                json!({
                    "name": function.name,
                    "description": function.description,
                    "input_schema": function.parameters,
                })
            })
            .collect()
    }
}

/// Backends that omit call ids get a generated one.
pub fn ensure_call_id(id: Option<String>) -> String {
    match id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("call_{}", Uuid::new_v4().simple()),
    }
}

/// Builds a call from an id, a name and arguments that may arrive either as
/// a JSON string or as an object.
pub fn tool_call_from_parts(id: Option<String>, name: String, arguments: &Value) -> ToolCallRequest {
    let arguments = match arguments {
        Value::String(text) => text.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    };
    ToolCallRequest::new(ensure_call_id(id), name, arguments)
}

fn arguments_object(raw: &str) -> JsonMap<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => JsonMap::new(),
    }
}

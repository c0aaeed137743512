//! Optional post-processing of tool results before they enter the conversation.

use serde_json::Value;
use std::sync::Arc;

/// Names accepted by [`builtin`].
pub const BUILTIN_HOOKS: &[&str] = &["json"];

/// What a hook hands back for one tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutput {
    /// Replacement text; also attached as the message's data.
    Text(String),
    /// Replacement text plus separate structured data.
    Structured { contents: String, data: Value },
}

pub trait ResultHook: Send + Sync {
    fn process(&self, tool_name: &str, content: &str) -> HookOutput;
}

impl<F> ResultHook for F
where
    F: Fn(&str, &str) -> HookOutput + Send + Sync,
{
    fn process(&self, tool_name: &str, content: &str) -> HookOutput {
        self(tool_name, content)
    }
}

impl HookOutput {
    pub(crate) fn into_parts(self) -> (String, Value) {
        match self {
            HookOutput::Text(text) => {
                let data = Value::String(text.clone());
                (text, data)
            }
            HookOutput::Structured { contents, data } => (contents, data),
        }
    }
}

/// Looks up a built-in hook by its configured name.
pub fn builtin(name: &str) -> Option<Arc<dyn ResultHook>> {
    let hook: Arc<dyn ResultHook> = match name {
        "json" => Arc::new(json_data),
        _ => return None,
    };
    Some(hook)
}

/// Keeps the text and attaches it parsed as JSON when it is valid JSON.
fn json_data(_tool_name: &str, content: &str) -> HookOutput {
    match serde_json::from_str::<Value>(content) {
        Ok(data) => HookOutput::Structured {
            contents: content.to_string(),
            data,
        },
        Err(_) => HookOutput::Text(content.to_string()),
    }
}

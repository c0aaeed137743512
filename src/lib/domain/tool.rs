//! Tool metadata shared by discovery, validation and prompt formatting.

use crate::constants::TOOL_NAME_DELIMITER;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value, json};

/// Parameter schema of a tool as advertised by its provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub properties: JsonMap<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    /// The schema exactly as received, forwarded to backends untouched.
    #[serde(skip)]
    pub raw: Value,
}

impl ToolSchema {
    pub fn from_value(value: Value) -> Self {
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let required = value
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            properties,
            required,
            raw: value,
        }
    }

    /// First required parameter absent from `arguments`, if any.
    pub fn first_missing<'a>(&'a self, arguments: &JsonMap<String, Value>) -> Option<&'a str> {
        self.required
            .iter()
            .map(String::as_str)
            .find(|name| !arguments.contains_key(*name))
    }

    fn as_parameters(&self) -> Value {
        if self.raw.is_object() {
            return self.raw.clone();
        }
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// One callable operation exposed by a tool provider. Immutable once
/// discovered; a refresh replaces the whole catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: ToolSchema,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: ToolSchema::from_value(schema),
        }
    }

    /// Parses one entry of a `tools/list` result.
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name").and_then(Value::as_str)?;
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = entry
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"}));
        Some(Self::new(name, description, schema))
    }

    pub fn format_for_llm(&self) -> String {
        let mut args = Vec::new();
        for (param, info) in &self.input_schema.properties {
            let description = info
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("No description");
            let mut line = format!("- {param}: {description}");
            if self.input_schema.required.iter().any(|r| r == param) {
                line.push_str(" (required)");
            }
            args.push(line);
        }
        format!(
            "\nTool: {}\nDescription: {}\nArguments:\n{}\n",
            self.name,
            self.description,
            args.join("\n")
        )
    }

    /// Catalogue entry addressed as `<provider>_<tool>`.
    pub fn to_function(&self, provider: &str) -> FunctionDefinition {
        FunctionDefinition {
            name: compound_name(provider, &self.name),
            description: self.description.clone(),
            parameters: self.input_schema.as_parameters(),
        }
    }
}

/// Function catalogue entry handed to generation backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDefinition {
    /// OpenAI-style `{"type":"function","function":{..}}` envelope.
    pub fn to_openai_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

pub fn compound_name(provider: &str, tool: &str) -> String {
    format!("{provider}{TOOL_NAME_DELIMITER}{tool}")
}

/// Splits `<provider>_<tool>`. Exactly one delimiter with non-empty parts on
/// both sides is accepted.
pub fn split_compound_name(name: &str) -> Option<(&str, &str)> {
    let (provider, tool) = name.split_once(TOOL_NAME_DELIMITER)?;
    if provider.is_empty() || tool.is_empty() || tool.contains(TOOL_NAME_DELIMITER) {
        return None;
    }
    Some((provider, tool))
}

pub fn contains_delimiter(name: &str) -> bool {
    name.contains(TOOL_NAME_DELIMITER)
}

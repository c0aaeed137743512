use super::hook::ResultHook;
use super::invoker::ToolInvoker;
use super::registry::SessionRegistry;
use super::session::{SessionState, ToolCatalogue};
use crate::domain::tool::split_compound_name;
use crate::domain::types::{ChatMessage, ToolCallRequest};
use serde_json::{Map as JsonMap, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns one model-proposed call into exactly one tool-result message.
pub struct ToolCallRouter {
    registry: Arc<SessionRegistry>,
    invoker: ToolInvoker,
    hook: Option<Arc<dyn ResultHook>>,
}

impl ToolCallRouter {
    pub fn new(registry: Arc<SessionRegistry>, invoker: ToolInvoker) -> Self {
        Self {
            registry,
            invoker,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ResultHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn route(&self, call: &ToolCallRequest) -> ChatMessage {
        let Some((server, tool)) = split_compound_name(&call.name) else {
            warn!(function = %call.name, "invalid function name format");
            return rejection(call, "Invalid function name format");
        };
        let arguments = parse_arguments(&call.arguments);

        let Some(slot) = self.registry.get(server) else {
            warn!(server, tool, "model addressed an unknown server");
            return rejection(call, format!("Unknown server: {server}"));
        };

        let session = slot.session();
        if session.state().await != SessionState::Active {
            let _flight = slot.lock_flight().await;
            // Another call may have started it meanwhile.
            if session.state().await != SessionState::Active {
                info!(server, "starting tool provider before validating the call");
                if let Err(err) = session.start().await {
                    warn!(server, %err, "tool provider did not come up");
                }
            }
        }

        let catalogue = session.catalogue().await;
        match catalogue.find(tool) {
            Some(descriptor) => {
                if let Some(missing) = descriptor.input_schema.first_missing(&arguments) {
                    warn!(server, tool, parameter = missing, "missing required parameter");
                    return rejection(call, format!("Missing required parameter: {missing}"));
                }
            }
            // A provider that cannot list, or one that could not be started,
            // gets the call anyway.
            None => {
                if matches!(catalogue, ToolCatalogue::Listed(_))
                    && session.state().await == SessionState::Active
                {
                    warn!(server, tool, "model addressed an unknown tool");
                    return rejection(call, format!("Unknown tool: {tool}"));
                }
                debug!(server, tool, "tool not in catalogue; invoking anyway");
            }
        }

        info!(server, tool, call_id = %call.id, "invoking tool");
        match self.invoker.invoke(&slot, tool, arguments).await {
            Ok(outcome) => {
                let content = outcome.text();
                debug!(server, tool, is_error = outcome.is_error, "tool finished");
                self.finish(call, tool, content)
            }
            Err(err) => {
                warn!(server, tool, %err, "tool invocation failed");
                rejection(call, err.to_string())
            }
        }
    }

    /// Routes calls one after another, keeping their order.
    pub async fn route_all(&self, calls: &[ToolCallRequest]) -> Vec<ChatMessage> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.route(call).await);
        }
        results
    }

    fn finish(&self, call: &ToolCallRequest, tool: &str, content: String) -> ChatMessage {
        match &self.hook {
            Some(hook) => {
                let (content, data) = hook.process(tool, &content).into_parts();
                ChatMessage::tool_result(&call.id, &call.name, content, Some(data))
            }
            None => ChatMessage::tool_result(&call.id, &call.name, content, None),
        }
    }
}

/// Malformed or non-object arguments become an empty map.
pub fn parse_arguments(raw: &str) -> JsonMap<String, Value> {
    if raw.trim().is_empty() {
        return JsonMap::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(arguments = %other, "tool arguments are not an object; using none");
            JsonMap::new()
        }
        Err(err) => {
            debug!(%err, "unparseable tool arguments; using none");
            JsonMap::new()
        }
    }
}

fn rejection(call: &ToolCallRequest, message: impl Into<String>) -> ChatMessage {
    let content = json!({ "error": message.into() }).to_string();
    ChatMessage::tool_result(&call.id, &call.name, content, None)
}

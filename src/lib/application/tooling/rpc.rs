//! JSON-RPC 2.0 framing and request correlation shared by both transports.

use super::error::ToolInvokeError;
use crate::constants::PROTOCOL_VERSION;
use crate::domain::tool::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const TOOLS_CHANGED: &str = "notifications/tools/list_changed";

type Responder = oneshot::Sender<Result<Value, ToolInvokeError>>;

/// Outbound half of a connection.
#[async_trait]
pub(crate) trait FrameSink: Send + Sync {
    async fn send_frame(&self, frame: &Value) -> Result<(), ToolInvokeError>;
}

/// Result of one `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutcome {
    /// The provider ran the tool and flagged failure.
    pub is_error: bool,
    /// Textual segments of the result content, in order.
    pub contents: Vec<String>,
    pub raw: Value,
}

impl ToolCallOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::from_texts(false, vec![text.into()])
    }

    pub fn tool_error(text: impl Into<String>) -> Self {
        Self::from_texts(true, vec![text.into()])
    }

    fn from_texts(is_error: bool, contents: Vec<String>) -> Self {
        let raw = json!({
            "isError": is_error,
            "content": contents
                .iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect::<Vec<_>>(),
        });
        Self {
            is_error,
            contents,
            raw,
        }
    }

    pub fn from_result(raw: Value) -> Self {
        let is_error = raw.get("isError").and_then(Value::as_bool).unwrap_or(false);
        let contents = raw
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            is_error,
            contents,
            raw,
        }
    }

    /// Text segments joined with newlines.
    pub fn text(&self) -> String {
        self.contents.join("\n")
    }
}

/// What an inbound frame turned out to be once responses were settled.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Settled,
    Notification(String),
}

struct Pending {
    open: bool,
    waiters: HashMap<String, Responder>,
}

/// Request id allocation and response correlation for one session.
pub(crate) struct RpcChannel {
    server: String,
    pending: AsyncMutex<Pending>,
    id_counter: AtomicU64,
}

impl RpcChannel {
    pub(crate) fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            pending: AsyncMutex::new(Pending {
                open: false,
                waiters: HashMap::new(),
            }),
            id_counter: AtomicU64::new(1),
        }
    }

    /// Accept requests again after a (re)connect.
    pub(crate) async fn reopen(&self) {
        self.pending.lock().await.open = true;
    }

    pub(crate) async fn is_open(&self) -> bool {
        self.pending.lock().await.open
    }

    /// Refuse new requests and fail every waiter with `ConnectionClosed`.
    pub(crate) async fn close(&self) {
        let mut pending = self.pending.lock().await;
        pending.open = false;
        for (id, sender) in pending.waiters.drain() {
            debug!(server = %self.server, request_id = %id, "failing pending request");
            let _ = sender.send(Err(ToolInvokeError::ConnectionClosed {
                server: self.server.clone(),
            }));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    pub(crate) async fn request(
        &self,
        sink: &dyn FrameSink,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if !pending.open {
                return Err(ToolInvokeError::ConnectionClosed {
                    server: self.server.clone(),
                });
            }
            pending.waiters.insert(id.clone(), tx);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        debug!(server = %self.server, request_id = %id, method, "sending request");
        if let Err(err) = sink.send_frame(&payload).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(ToolInvokeError::ConnectionClosed {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                Err(ToolInvokeError::Timeout {
                    server: self.server.clone(),
                    timeout,
                })
            }
        }
    }

    pub(crate) async fn notify(
        &self,
        sink: &dyn FrameSink,
        method: &str,
        params: Value,
    ) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        sink.send_frame(&payload).await
    }

    /// Settles responses, answers server requests and reports notifications.
    pub(crate) async fn handle_inbound(&self, sink: &dyn FrameSink, value: Value) -> Inbound {
        let method = value.get("method").and_then(Value::as_str).map(str::to_string);
        match (value.get("id").cloned(), method) {
            (Some(id), Some(method)) => {
                let reply = server_reply(id, &method);
                if method != "ping" {
                    warn!(server = %self.server, method = %method, "server sent unsupported request");
                }
                if let Err(err) = sink.send_frame(&reply).await {
                    warn!(server = %self.server, %err, "failed to answer server request");
                }
                Inbound::Settled
            }
            (Some(id), None) => {
                self.settle(&id, value).await;
                Inbound::Settled
            }
            (None, Some(method)) => {
                debug!(server = %self.server, method = %method, "received notification from server");
                Inbound::Notification(method)
            }
            (None, None) => Inbound::Settled,
        }
    }

    async fn settle(&self, id: &Value, value: Value) {
        let key = match id {
            Value::String(value) => value.clone(),
            Value::Number(num) => num.to_string(),
            _ => return,
        };
        let responder = self.pending.lock().await.waiters.remove(&key);
        let Some(sender) = responder else {
            debug!(server = %self.server, response_id = %key, "received response for unknown request");
            return;
        };

        let outcome = match value.get("error") {
            Some(error) => Err(ToolInvokeError::Rpc {
                server: self.server.clone(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(value),
        };
        let _ = sender.send(outcome);
    }
}

pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {}
    })
}

pub(crate) fn call_params(tool: &str, arguments: JsonMap<String, Value>) -> Value {
    json!({
        "name": tool,
        "arguments": Value::Object(arguments),
    })
}

pub(crate) fn parse_tools(result: &Value) -> Vec<ToolDescriptor> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(ToolDescriptor::from_listing).collect())
        .unwrap_or_default()
}

/// `ping` gets an empty result; anything else is method-not-found.
pub(crate) fn server_reply(id: Value, method: &str) -> Value {
    if method == "ping" {
        return json!({"jsonrpc": "2.0", "id": id, "result": {}});
    }
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("client does not implement method '{method}'"),
        }
    })
}

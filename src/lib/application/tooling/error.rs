use std::time::Duration;
use thiserror::Error;

/// Recovery class of a session-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The connection is gone; the session must be rebuilt before retrying.
    Connection,
    /// Malformed traffic, RPC error or deadline; a plain retry may succeed.
    Protocol,
}

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("MCP server '{server}' is not configured")]
    NotConfigured { server: String },
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to MCP server '{server}': {message}")]
    Connect { server: String, message: String },
    #[error("MCP server '{server}' has not been started")]
    NotStarted { server: String },
    #[error("MCP server '{server}' closed the connection")]
    ConnectionClosed { server: String },
    #[error("MCP server '{server}' did not answer within {timeout:?}")]
    Timeout { server: String, timeout: Duration },
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
}

impl ToolInvokeError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ToolInvokeError::NotStarted { .. } | ToolInvokeError::ConnectionClosed { .. } => {
                FailureClass::Connection
            }
            _ => FailureClass::Protocol,
        }
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(self, ToolInvokeError::Rpc { code, .. } if *code == super::rpc::METHOD_NOT_FOUND)
    }
}

/// Failure surfaced by the invoker once its attempt budget is spent.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("tool '{tool}' on '{server}' unreachable after {attempts} attempts: {source}")]
    Disconnected {
        server: String,
        tool: String,
        attempts: u32,
        #[source]
        source: ToolInvokeError,
    },
    #[error("tool '{tool}' on '{server}' failed after {attempts} attempts: {source}")]
    Failed {
        server: String,
        tool: String,
        attempts: u32,
        #[source]
        source: ToolInvokeError,
    },
}

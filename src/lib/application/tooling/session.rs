use super::error::ToolInvokeError;
use super::process::PipeSession;
use super::rpc::{self, FrameSink, Inbound, RpcChannel, ToolCallOutcome};
use super::sse::StreamSession;
use crate::config::{ServerConfig, ToolingConfig, TransportKind};
use crate::domain::tool::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Active,
    Closed,
}

/// What the provider last told us about its tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCatalogue {
    Listed(Vec<ToolDescriptor>),
    /// The provider answered `tools/list` with method-not-found.
    Unsupported,
}

impl Default for ToolCatalogue {
    fn default() -> Self {
        ToolCatalogue::Listed(Vec::new())
    }
}

impl ToolCatalogue {
    pub fn tools(&self) -> &[ToolDescriptor] {
        match self {
            ToolCatalogue::Listed(tools) => tools,
            ToolCatalogue::Unsupported => &[],
        }
    }

    pub fn find(&self, tool: &str) -> Option<&ToolDescriptor> {
        self.tools().iter().find(|descriptor| descriptor.name == tool)
    }
}

/// One connection to a tool provider.
#[async_trait]
pub trait ToolSession: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TransportKind;

    async fn state(&self) -> SessionState;

    /// Connects, runs the initialize handshake and refreshes the catalogue.
    /// Any resources left by a previous attempt are released first.
    async fn start(&self) -> Result<(), ToolInvokeError>;

    /// Asks the provider for its tools. Empty when the session is not active.
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Catalogue recorded by the last successful listing.
    async fn catalogue(&self) -> ToolCatalogue;

    async fn invoke(
        &self,
        tool: &str,
        arguments: JsonMap<String, Value>,
        timeout: Duration,
    ) -> Result<ToolCallOutcome, ToolInvokeError>;

    /// Releases the connection. Safe to call repeatedly or before `start`.
    async fn stop(&self);
}

/// Builds the session variant selected by the server's transport.
pub fn connect(server: &ServerConfig, tooling: ToolingConfig) -> Arc<dyn ToolSession> {
    match server.kind() {
        TransportKind::Pipe => Arc::new(PipeSession::new(server.clone(), tooling)),
        TransportKind::Stream => Arc::new(StreamSession::new(server.clone(), tooling)),
    }
}

/// Protocol state common to both transports.
pub(crate) struct SessionCore {
    pub(crate) name: String,
    pub(crate) tooling: ToolingConfig,
    pub(crate) channel: RpcChannel,
    state: AsyncMutex<SessionState>,
    catalogue: AsyncMutex<ToolCatalogue>,
    pub(crate) cleanup_lock: AsyncMutex<()>,
}

impl SessionCore {
    pub(crate) fn new(name: impl Into<String>, tooling: ToolingConfig) -> Self {
        let name = name.into();
        Self {
            channel: RpcChannel::new(name.clone()),
            name,
            tooling,
            state: AsyncMutex::new(SessionState::Unstarted),
            catalogue: AsyncMutex::new(ToolCatalogue::default()),
            cleanup_lock: AsyncMutex::new(()),
        }
    }

    pub(crate) async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub(crate) async fn catalogue(&self) -> ToolCatalogue {
        self.catalogue.lock().await.clone()
    }

    /// A connection that dropped during the handshake lands directly in Closed.
    pub(crate) async fn activate(&self) {
        if self.channel.is_open().await {
            *self.state.lock().await = SessionState::Active;
            info!(server = %self.name, "MCP session ready");
        } else {
            *self.state.lock().await = SessionState::Closed;
            warn!(server = %self.name, "MCP server hung up right after the handshake");
        }
    }

    /// Called when the remote side goes away or on teardown.
    pub(crate) async fn mark_closed(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == SessionState::Active {
                *state = SessionState::Closed;
            }
        }
        self.channel.close().await;
    }

    /// Teardown bookkeeping: a session that was ever started ends up Closed.
    pub(crate) async fn finish_teardown(&self) {
        {
            let mut state = self.state.lock().await;
            if *state != SessionState::Unstarted {
                *state = SessionState::Closed;
            }
        }
        self.channel.close().await;
        *self.catalogue.lock().await = ToolCatalogue::default();
    }

    /// `initialize`, `notifications/initialized`, then the first listing.
    /// The channel must have been reopened before the reader was spawned.
    pub(crate) async fn handshake(&self, sink: &dyn FrameSink) -> Result<(), ToolInvokeError> {
        let timeout = self.tooling.handshake_timeout;
        let init = self
            .channel
            .request(sink, "initialize", rpc::initialize_params(), timeout)
            .await?;
        if let Some(server_info) = init.get("serverInfo") {
            debug!(server = %self.name, info = %server_info, "MCP server initialized");
        }
        self.channel
            .notify(sink, "notifications/initialized", json!({}))
            .await?;
        self.refresh(sink).await
    }

    pub(crate) async fn refresh(&self, sink: &dyn FrameSink) -> Result<(), ToolInvokeError> {
        let listing = self
            .channel
            .request(sink, "tools/list", json!({}), self.tooling.call_timeout)
            .await;
        let catalogue = match listing {
            Ok(result) => ToolCatalogue::Listed(rpc::parse_tools(&result)),
            Err(err) if err.is_method_not_found() => {
                info!(server = %self.name, "server does not support tool listing");
                ToolCatalogue::Unsupported
            }
            Err(err) => return Err(err),
        };
        debug!(
            server = %self.name,
            count = catalogue.tools().len(),
            "tool catalogue refreshed"
        );
        *self.catalogue.lock().await = catalogue;
        Ok(())
    }

    pub(crate) async fn list_tools(&self, sink: &dyn FrameSink) -> Vec<ToolDescriptor> {
        if self.state().await != SessionState::Active {
            return Vec::new();
        }
        match self.refresh(sink).await {
            Ok(()) => self.catalogue().await.tools().to_vec(),
            Err(err) => {
                warn!(server = %self.name, %err, "failed to list tools");
                Vec::new()
            }
        }
    }

    pub(crate) async fn invoke(
        &self,
        sink: &dyn FrameSink,
        tool: &str,
        arguments: JsonMap<String, Value>,
        timeout: Duration,
    ) -> Result<ToolCallOutcome, ToolInvokeError> {
        match self.state().await {
            SessionState::Active => {}
            SessionState::Unstarted => {
                return Err(ToolInvokeError::NotStarted {
                    server: self.name.clone(),
                });
            }
            SessionState::Closed => {
                return Err(ToolInvokeError::ConnectionClosed {
                    server: self.name.clone(),
                });
            }
        }
        let result = self
            .channel
            .request(sink, "tools/call", rpc::call_params(tool, arguments), timeout)
            .await?;
        Ok(ToolCallOutcome::from_result(result))
    }

    /// Returns true when the frame asks for a catalogue refresh.
    pub(crate) async fn dispatch(&self, sink: &dyn FrameSink, value: Value) -> bool {
        matches!(
            self.channel.handle_inbound(sink, value).await,
            Inbound::Notification(method) if method == rpc::TOOLS_CHANGED
        )
    }
}

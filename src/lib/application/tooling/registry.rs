use super::error::ToolInvokeError;
use super::session::{self, ToolSession};
use crate::config::{ServerConfig, ToolingConfig};
use crate::domain::tool::{FunctionDefinition, contains_delimiter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{info, warn};

/// A registered session plus the lock that keeps one invocation in flight.
pub struct SessionSlot {
    session: Arc<dyn ToolSession>,
    flight: AsyncMutex<()>,
}

impl SessionSlot {
    pub fn new(session: Arc<dyn ToolSession>) -> Self {
        Self {
            session,
            flight: AsyncMutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<dyn ToolSession> {
        &self.session
    }

    pub(crate) async fn lock_flight(&self) -> MutexGuard<'_, ()> {
        self.flight.lock().await
    }
}

/// Provider name to session mapping, fixed after construction.
pub struct SessionRegistry {
    slots: HashMap<String, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn from_config(servers: &[ServerConfig], tooling: ToolingConfig) -> Self {
        Self::from_sessions(
            servers
                .iter()
                .map(|server| session::connect(server, tooling))
                .collect(),
        )
    }

    pub fn from_sessions(sessions: Vec<Arc<dyn ToolSession>>) -> Self {
        let slots = sessions
            .into_iter()
            .map(|session| {
                (
                    session.name().to_string(),
                    Arc::new(SessionSlot::new(session)),
                )
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, server: &str) -> Option<Arc<SessionSlot>> {
        self.slots.get(server).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Starts every session. A provider that fails to come up is logged and
    /// left for the invoker to rebuild on first use.
    pub async fn start_all(&self) -> Vec<(String, ToolInvokeError)> {
        let mut failures = Vec::new();
        for name in self.names() {
            let Some(slot) = self.slots.get(name) else {
                continue;
            };
            match slot.session.start().await {
                Ok(()) => {
                    let count = slot.session.catalogue().await.tools().len();
                    info!(server = name, tools = count, "tool provider started");
                }
                Err(err) => {
                    warn!(server = name, %err, "failed to start tool provider");
                    failures.push((name.to_string(), err));
                }
            }
        }
        failures
    }

    /// Function catalogue across all providers, ordered by provider name.
    pub async fn function_catalogue(&self) -> Vec<FunctionDefinition> {
        let mut functions = Vec::new();
        for name in self.names() {
            let Some(slot) = self.slots.get(name) else {
                continue;
            };
            let catalogue = slot.session.catalogue().await;
            for tool in catalogue.tools() {
                if contains_delimiter(&tool.name) {
                    warn!(
                        server = name,
                        tool = %tool.name,
                        "tool name contains the compound-name delimiter; leaving it out"
                    );
                    continue;
                }
                functions.push(tool.to_function(name));
            }
        }
        functions
    }

    /// Human-readable tool listing, one block per tool.
    pub async fn describe_tools(&self) -> String {
        let mut blocks = Vec::new();
        for name in self.names() {
            if let Some(slot) = self.slots.get(name) {
                for tool in slot.session.catalogue().await.tools() {
                    blocks.push(tool.format_for_llm());
                }
            }
        }
        blocks.join("\n")
    }

    pub async fn shutdown(&self) {
        for name in self.names() {
            if let Some(slot) = self.slots.get(name) {
                let _flight = slot.lock_flight().await;
                slot.session.stop().await;
            }
        }
    }
}

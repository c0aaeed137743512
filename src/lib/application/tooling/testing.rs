//! Scripted `ToolSession` used by the tooling and agent tests.

use super::error::ToolInvokeError;
use super::rpc::ToolCallOutcome;
use super::session::{SessionState, ToolCatalogue, ToolSession};
use crate::config::TransportKind;
use crate::domain::tool::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub tool: String,
    pub arguments: JsonMap<String, Value>,
    /// How many times `start` had run when this call arrived.
    pub starts_before: usize,
}

pub(crate) struct ScriptedSession {
    name: String,
    state: Mutex<SessionState>,
    catalogue: Mutex<ToolCatalogue>,
    script: Mutex<VecDeque<Result<ToolCallOutcome, ToolInvokeError>>>,
    fallback: Mutex<ToolCallOutcome>,
    fail_start: bool,
    /// Catalogue installed by a successful `start`.
    on_start: Mutex<Option<ToolCatalogue>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedSession {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(SessionState::Unstarted),
            catalogue: Mutex::new(ToolCatalogue::default()),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ToolCallOutcome::success("ok")),
            fail_start: false,
            on_start: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn active(self) -> Self {
        *self.state.lock().unwrap() = SessionState::Active;
        self
    }

    pub fn with_catalogue(self, catalogue: ToolCatalogue) -> Self {
        *self.catalogue.lock().unwrap() = catalogue;
        self
    }

    pub fn with_tools(self, tools: Vec<ToolDescriptor>) -> Self {
        self.with_catalogue(ToolCatalogue::Listed(tools))
    }

    /// Leaves the catalogue empty until `start` lists these tools.
    pub fn listing_on_start(self, tools: Vec<ToolDescriptor>) -> Self {
        *self.on_start.lock().unwrap() = Some(ToolCatalogue::Listed(tools));
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn then(self, result: Result<ToolCallOutcome, ToolInvokeError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    /// Outcome returned once the script runs dry.
    pub fn otherwise(self, outcome: ToolCallOutcome) -> Self {
        *self.fallback.lock().unwrap() = outcome;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closed(&self) -> ToolInvokeError {
        ToolInvokeError::ConnectionClosed {
            server: self.name.clone(),
        }
    }
}

#[async_trait]
impl ToolSession for ScriptedSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    async fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), ToolInvokeError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(ToolInvokeError::Connect {
                server: self.name.clone(),
                message: "refused".into(),
            });
        }
        if let Some(catalogue) = self.on_start.lock().unwrap().clone() {
            *self.catalogue.lock().unwrap() = catalogue;
        }
        *self.state.lock().unwrap() = SessionState::Active;
        Ok(())
    }

    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        if *self.state.lock().unwrap() != SessionState::Active {
            return Vec::new();
        }
        self.catalogue.lock().unwrap().tools().to_vec()
    }

    async fn catalogue(&self) -> ToolCatalogue {
        self.catalogue.lock().unwrap().clone()
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: JsonMap<String, Value>,
        _timeout: Duration,
    ) -> Result<ToolCallOutcome, ToolInvokeError> {
        self.calls.lock().unwrap().push(RecordedCall {
            tool: tool.to_string(),
            arguments,
            starts_before: self.starts(),
        });
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(err)) => {
                if matches!(err, ToolInvokeError::ConnectionClosed { .. }) {
                    *self.state.lock().unwrap() = SessionState::Closed;
                }
                Err(err)
            }
            Some(Ok(outcome)) => Ok(outcome),
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state != SessionState::Unstarted {
            *state = SessionState::Closed;
        }
    }
}

use super::error::ToolInvokeError;
use super::rpc::{FrameSink, ToolCallOutcome};
use super::session::{SessionCore, SessionState, ToolCatalogue, ToolSession};
use crate::config::{ServerConfig, ToolingConfig, TransportConfig, TransportKind};
use crate::domain::tool::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tool provider running as a child process, speaking newline-delimited
/// JSON-RPC over its stdin/stdout.
#[derive(Clone)]
pub struct PipeSession {
    inner: Arc<PipeInner>,
}

struct PipeInner {
    core: SessionCore,
    launch: Launch,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    child: AsyncMutex<Option<Child>>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
}

struct Launch {
    command: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    workdir: Option<PathBuf>,
}

impl PipeSession {
    pub fn new(server: ServerConfig, tooling: ToolingConfig) -> Self {
        let launch = match server.transport {
            TransportConfig::Pipe {
                command,
                args,
                env,
                workdir,
            } => Launch {
                command,
                args,
                env,
                workdir,
            },
            TransportConfig::Stream { url } => {
                warn!(server = %server.name, url = %url, "stream server handed to pipe session");
                Launch {
                    command: PathBuf::new(),
                    args: Vec::new(),
                    env: HashMap::new(),
                    workdir: None,
                }
            }
        };
        Self {
            inner: Arc::new(PipeInner {
                core: SessionCore::new(server.name, tooling),
                launch,
                writer: AsyncMutex::new(None),
                child: AsyncMutex::new(None),
                reader: AsyncMutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl ToolSession for PipeSession {
    fn name(&self) -> &str {
        &self.inner.core.name
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    async fn state(&self) -> SessionState {
        self.inner.core.state().await
    }

    async fn start(&self) -> Result<(), ToolInvokeError> {
        self.inner.teardown().await;

        let handshake_timeout = self.inner.core.tooling.handshake_timeout;
        let opened = tokio::time::timeout(handshake_timeout, self.inner.open()).await;
        let result = match opened {
            Ok(result) => result,
            Err(_) => Err(ToolInvokeError::Timeout {
                server: self.inner.core.name.clone(),
                timeout: handshake_timeout,
            }),
        };
        match result {
            Ok(()) => {
                self.inner.core.activate().await;
                Ok(())
            }
            Err(err) => {
                self.inner.teardown().await;
                Err(err)
            }
        }
    }

    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.core.list_tools(&*self.inner).await
    }

    async fn catalogue(&self) -> ToolCatalogue {
        self.inner.core.catalogue().await
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: JsonMap<String, Value>,
        timeout: Duration,
    ) -> Result<ToolCallOutcome, ToolInvokeError> {
        self.inner
            .core
            .invoke(&*self.inner, tool, arguments, timeout)
            .await
    }

    async fn stop(&self) {
        self.inner.teardown().await;
    }
}

impl PipeInner {
    async fn open(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        let mut command = Command::new(&self.launch.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.launch.workdir {
            command.current_dir(dir);
        }
        if !self.launch.args.is_empty() {
            command.args(&self.launch.args);
        }
        for (key, value) in &self.launch.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ToolInvokeError::Spawn {
            server: self.core.name.clone(),
            source,
        })?;
        info!(
            server = %self.core.name,
            command = %self.launch.command.display(),
            "spawned MCP server process"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.transport_error("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.transport_error("failed to capture server stdout"))?;

        *self.writer.lock().await = Some(BufWriter::new(stdin));
        *self.child.lock().await = Some(child);

        self.core.channel.reopen().await;
        let reader_self = Arc::clone(self);
        let handle = tokio::spawn(async move {
            reader_self.reader_loop(stdout).await;
        });
        *self.reader.lock().await = Some(handle);

        self.core.handshake(&**self).await
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let raw = match lines.next_line().await {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(err) => {
                    warn!(server = %self.core.name, %err, "failed to read from MCP server");
                    break;
                }
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    server = %self.core.name,
                    line = trimmed,
                    "skipping non-JSON ANSI log line from MCP server"
                );
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if self.core.dispatch(&*self, value).await {
                        let refresher = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(err) = refresher.core.refresh(&*refresher).await {
                                warn!(
                                    server = %refresher.core.name,
                                    %err,
                                    "failed to refresh tool catalogue"
                                );
                            }
                        });
                    }
                }
                Err(source) => {
                    warn!(
                        server = %self.core.name,
                        line = trimmed,
                        %source,
                        "received invalid JSON from MCP server"
                    );
                }
            }
        }

        debug!(server = %self.core.name, "MCP server closed its stdout");
        self.core.mark_closed().await;
    }

    /// Releases the reader, the pipe and the child. Returns whether anything
    /// was held.
    async fn teardown(&self) -> bool {
        let _guard = self.core.cleanup_lock.lock().await;
        let mut released = false;

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            released = true;
        }
        if self.writer.lock().await.take().is_some() {
            released = true;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(
                    server = %self.core.name,
                    %err,
                    "failed to kill MCP server process (may have already exited)"
                );
            }
            let _ = child.wait().await;
            released = true;
        }

        self.core.finish_teardown().await;
        if released {
            info!(server = %self.core.name, "MCP server process stopped");
        }
        released
    }

    fn transport_error(&self, message: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::Transport {
            server: self.core.name.clone(),
            message: message.into(),
        }
    }

    fn write_error(&self, source: io::Error) -> ToolInvokeError {
        if source.kind() == io::ErrorKind::BrokenPipe {
            ToolInvokeError::ConnectionClosed {
                server: self.core.name.clone(),
            }
        } else {
            self.transport_error(source.to_string())
        }
    }
}

#[async_trait]
impl FrameSink for PipeInner {
    async fn send_frame(&self, frame: &Value) -> Result<(), ToolInvokeError> {
        let encoded =
            serde_json::to_string(frame).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.core.name.clone(),
                source,
            })?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| ToolInvokeError::ConnectionClosed {
                server: self.core.name.clone(),
            })?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| self.write_error(source))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| self.write_error(source))?;
        stream
            .flush()
            .await
            .map_err(|source| self.write_error(source))?;
        Ok(())
    }
}

use super::error::ToolInvokeError;
use super::rpc::{FrameSink, ToolCallOutcome};
use super::session::{SessionCore, SessionState, ToolCatalogue, ToolSession};
use crate::config::{ServerConfig, ToolingConfig, TransportConfig, TransportKind};
use crate::domain::tool::ToolDescriptor;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde_json::{Map as JsonMap, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

/// Tool provider reached through a server-sent event stream. Frames from the
/// server arrive as `message` events; frames to the server are POSTed to the
/// URL announced by the first `endpoint` event.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    core: SessionCore,
    url: String,
    http: Client,
    post_url: AsyncMutex<Option<Url>>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    pub fn new(server: ServerConfig, tooling: ToolingConfig) -> Self {
        let url = match server.transport {
            TransportConfig::Stream { url } => url,
            TransportConfig::Pipe { command, .. } => {
                warn!(
                    server = %server.name,
                    command = %command.display(),
                    "pipe server handed to stream session"
                );
                String::new()
            }
        };
        Self {
            inner: Arc::new(StreamInner {
                core: SessionCore::new(server.name, tooling),
                url,
                http: Client::new(),
                post_url: AsyncMutex::new(None),
                reader: AsyncMutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl ToolSession for StreamSession {
    fn name(&self) -> &str {
        &self.inner.core.name
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn state(&self) -> SessionState {
        self.inner.core.state().await
    }

    async fn start(&self) -> Result<(), ToolInvokeError> {
        self.inner.teardown().await;

        let handshake_timeout = self.inner.core.tooling.handshake_timeout;
        let result = match tokio::time::timeout(handshake_timeout, self.inner.open()).await {
            Ok(result) => result,
            Err(_) => Err(ToolInvokeError::Timeout {
                server: self.inner.core.name.clone(),
                timeout: handshake_timeout,
            }),
        };
        if let Err(err) = result {
            self.inner.teardown().await;
            return Err(err);
        }
        self.inner.core.activate().await;
        Ok(())
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

impl StreamInner {
    async fn open(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        let base = Url::parse(&self.url).map_err(|err| self.connect_error(err))?;
        let mut source =
            EventSource::new(self.http.get(base.clone())).map_err(|err| self.connect_error(err))?;
        source.set_retry_policy(Box::new(Never));

        let post_url = loop {
            match source.next().await {
                Some(Ok(Event::Open)) => {
                    debug!(server = %self.core.name, url = %base, "event stream opened");
                }
                Some(Ok(Event::Message(message))) if message.event == ENDPOINT_EVENT => {
                    break base
                        .join(message.data.trim())
                        .map_err(|err| self.connect_error(err))?;
                }
                Some(Ok(Event::Message(message))) => {
                    debug!(
                        server = %self.core.name,
                        event = %message.event,
                        "ignoring event before endpoint announcement"
                    );
                }
                Some(Err(err)) => {
                    source.close();
                    return Err(self.connect_error(err));
                }
                None => {
                    return Err(ToolInvokeError::ConnectionClosed {
                        server: self.core.name.clone(),
                    });
                }
            }
        };
        info!(server = %self.core.name, endpoint = %post_url, "connected to MCP event stream");
        *self.post_url.lock().await = Some(post_url);

        self.core.channel.reopen().await;
        let reader_self = Arc::clone(self);
        let handle = tokio::spawn(async move {
            reader_self.reader_loop(source).await;
        });
        *self.reader.lock().await = Some(handle);

        self.core.handshake(&**self).await
    }

    async fn reader_loop(self: Arc<Self>, mut source: EventSource) {
        while let Some(event) = source.next().await {
            let message = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => message,
                Err(err) => {
                    warn!(server = %self.core.name, %err, "MCP event stream ended");
                    break;
                }
            };
            if message.event != MESSAGE_EVENT {
                debug!(server = %self.core.name, event = %message.event, "ignoring event");
                continue;
            }
            match serde_json::from_str::<Value>(&message.data) {
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
                        data = %message.data,
                        %source,
                        "received invalid JSON from MCP server"
                    );
                }
            }
        }

        source.close();
        self.core.mark_closed().await;
    }

    async fn teardown(&self) -> bool {
        let _guard = self.core.cleanup_lock.lock().await;
        let mut released = false;

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            released = true;
        }
        if self.post_url.lock().await.take().is_some() {
            released = true;
        }

        self.core.finish_teardown().await;
        if released {
            info!(server = %self.core.name, "MCP event stream closed");
        }
        released
    }

    fn connect_error(&self, err: impl std::fmt::Display) -> ToolInvokeError {
        ToolInvokeError::Connect {
            server: self.core.name.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl FrameSink for StreamInner {
    async fn send_frame(&self, frame: &Value) -> Result<(), ToolInvokeError> {
        let target = self
            .post_url
            .lock()
            .await
            .clone()
            .ok_or_else(|| ToolInvokeError::ConnectionClosed {
                server: self.core.name.clone(),
            })?;

        let response = self
            .http
            .post(target)
            .json(frame)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    ToolInvokeError::ConnectionClosed {
                        server: self.core.name.clone(),
                    }
                } else {
                    ToolInvokeError::Transport {
                        server: self.core.name.clone(),
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolInvokeError::Transport {
                server: self.core.name.clone(),
                message: format!("POST returned {status}: {body}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    const POST_PATH: &str = "/messages?session_id=abc";

    /// Frames for the open event stream. `None` hangs the stream up.
    type Outbox = mpsc::UnboundedSender<Option<Value>>;
    type Inbox = Arc<AsyncMutex<Option<mpsc::UnboundedReceiver<Option<Value>>>>>;

    /// Minimal MCP server over SSE: one event stream, answers to POSTed frames.
    struct ArchiServer {
        url: String,
        posted: Arc<Mutex<Vec<String>>>,
    }

    enum Reply {
        Frame(Value),
        Hangup,
        Nothing,
    }

    async fn serve_archi() -> ArchiServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let posted = Arc::new(Mutex::new(Vec::new()));
        let (outbox, frames) = mpsc::unbounded_channel();
        let inbox: Inbox = Arc::new(AsyncMutex::new(Some(frames)));

        let log = posted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (outbox, inbox, log) = (outbox.clone(), inbox.clone(), log.clone());
                tokio::spawn(async move {
                    let _ = handle_connection(stream, outbox, inbox, log).await;
                });
            }
        });

        ArchiServer {
            url: format!("http://{addr}/sse"),
            posted,
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        outbox: Outbox,
        inbox: Inbox,
        log: Arc<Mutex<Vec<String>>>,
    ) -> std::io::Result<()> {
        let (head, body) = read_request(&mut stream).await?;
        let mut request_line = head.split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();

        if method == "GET" {
            let Some(mut frames) = inbox.lock().await.take() else {
                return Ok(());
            };
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n")
                .await?;
            stream
                .write_all(format!("event: endpoint\ndata: {POST_PATH}\n\n").as_bytes())
                .await?;
            stream.flush().await?;
            while let Some(Some(frame)) = frames.recv().await {
                stream
                    .write_all(format!("event: message\ndata: {frame}\n\n").as_bytes())
                    .await?;
                stream.flush().await?;
            }
            return Ok(());
        }

        log.lock().unwrap().push(path);
        stream
            .write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await?;
        stream.flush().await?;
        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        match reply(&request) {
            Reply::Frame(frame) => {
                let _ = outbox.send(Some(frame));
            }
            Reply::Hangup => {
                let _ = outbox.send(None);
            }
            Reply::Nothing => {}
        }
        Ok(())
    }

    async fn read_request(stream: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                return Ok((String::from_utf8_lossy(&buffer).into_owned(), Vec::new()));
            }
            buffer.extend_from_slice(&chunk[..read]);
        };

        let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = buffer[head_end..].to_vec();
        while body.len() < length {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }
        Ok((head, body))
    }

    /// A height of 99 makes the server drop the event stream instead of answering.
    fn reply(request: &Value) -> Reply {
        let height = &request["params"]["arguments"]["height"];
        let result = match request["method"].as_str() {
            Some("initialize") => json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "archi"}
            }),
            Some("tools/list") => json!({"tools": [{
                "name": "check",
                "description": "Check a building height",
                "inputSchema": {
                    "type": "object",
                    "properties": {"height": {"type": "number"}},
                    "required": ["height"]
                }
            }]}),
            Some("tools/call") if *height == json!(99) => return Reply::Hangup,
            Some("tools/call") => json!({
                "isError": false,
                "content": [{"type": "text", "text": format!("height {height} is compliant")}]
            }),
            _ => return Reply::Nothing,
        };
        Reply::Frame(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
    }

    fn height(value: u64) -> JsonMap<String, Value> {
        let mut arguments = JsonMap::new();
        arguments.insert("height".into(), json!(value));
        arguments
    }

    #[tokio::test]
    async fn live_session_handshakes_invokes_and_sees_the_hangup() {
        let server = serve_archi().await;
        let session = StreamSession::new(
            ServerConfig::stream("archi", server.url.as_str()),
            ToolingConfig::default(),
        );

        session.start().await.expect("handshake");
        assert_eq!(session.state().await, SessionState::Active);
        let catalogue = session.catalogue().await;
        let check = catalogue.find("check").expect("listed during start");
        assert_eq!(check.input_schema.first_missing(&JsonMap::new()), Some("height"));

        let outcome = session
            .invoke("check", height(30), Duration::from_secs(5))
            .await
            .expect("answered over the event stream");
        assert!(!outcome.is_error);
        assert_eq!(outcome.text(), "height 30 is compliant");

        // initialize, notifications/initialized, tools/list, tools/call
        let posted = server.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 4);
        assert!(posted.iter().all(|path| path == POST_PATH));

        let err = session
            .invoke("check", height(99), Duration::from_secs(5))
            .await
            .expect_err("stream dropped");
        assert!(matches!(err, ToolInvokeError::ConnectionClosed { .. }));
        assert_eq!(session.state().await, SessionState::Closed);

        session.stop().await;
        session.stop().await;
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn unstarted_stream_session_refuses_calls_and_lists_nothing() {
        let session = StreamSession::new(
            ServerConfig::stream("archi", "http://127.0.0.1:9/sse"),
            ToolingConfig::default(),
        );
        assert_eq!(session.kind(), TransportKind::Stream);
        assert!(session.list_tools().await.is_empty());
        let err = session
            .invoke("check", JsonMap::new(), Duration::from_secs(1))
            .await
            .expect_err("not started");
        assert!(matches!(err, ToolInvokeError::NotStarted { .. }));
    }

    #[tokio::test]
    async fn invalid_url_fails_to_connect_and_stays_stoppable() {
        let session = StreamSession::new(
            ServerConfig::stream("archi", "not a url"),
            ToolingConfig::default(),
        );
        let err = session.start().await.expect_err("bad url");
        assert!(matches!(err, ToolInvokeError::Connect { .. }));
        session.stop().await;
        session.stop().await;
        assert_eq!(session.state().await, SessionState::Unstarted);
    }

    #[tokio::test]
    async fn sending_without_endpoint_is_a_closed_connection() {
        let session = StreamSession::new(
            ServerConfig::stream("archi", "http://127.0.0.1:9/sse"),
            ToolingConfig::default(),
        );
        let err = session
            .inner
            .send_frame(&json!({"jsonrpc": "2.0", "method": "ping"}))
            .await
            .expect_err("no endpoint");
        assert!(matches!(err, ToolInvokeError::ConnectionClosed { .. }));
        assert!(!session.inner.teardown().await);
    }
}

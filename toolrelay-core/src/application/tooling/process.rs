use super::error::TransportError;
use super::interface::{SessionConnector, ToolDescriptor, ToolSession};
use crate::config::ServerConfig;
use crate::rpc::types::MCP_PROTOCOL_VERSION;
use crate::rpc::{RpcRequest, RpcResponse};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const MAX_TOOL_PAGES: usize = 64;

type Responder = oneshot::Sender<Result<Value, TransportError>>;

/// Launches the configured peer and hands out initialised [`StdioSession`]s.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    server: ServerConfig,
}

impl StdioConnector {
    pub fn new(server: ServerConfig) -> Self {
        Self { server }
    }
}

#[async_trait]
impl SessionConnector for StdioConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>, TransportError> {
        let session = StdioSession::spawn(&self.server)?;
        match session.initialize(self.server.handshake_timeout).await {
            Ok(()) => Ok(Box::new(session)),
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }
}

/// MCP session over a child process's stdin/stdout.
///
/// The child is killed when the session is dropped without being closed.
pub struct StdioSession {
    channel: Arc<Channel>,
    child: AsyncMutex<Option<Child>>,
    reader: AbortHandle,
    call_timeout: Duration,
    closed: AtomicBool,
}

/// Request/response plumbing shared with the reader task.
struct Channel {
    server: String,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    reader_alive: AtomicBool,
}

impl StdioSession {
    pub fn spawn(server: &ServerConfig) -> Result<Self, TransportError> {
        let mut command = Command::new(&server.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &server.workdir {
            command.current_dir(dir);
        }
        if !server.args.is_empty() {
            command.args(&server.args);
        }
        for (key, value) in &server.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            server: server.name.clone(),
            source,
        })?;

        let capture_error = |stream: &str| TransportError::Transport {
            server: server.name.clone(),
            message: format!("failed to capture server {stream}"),
        };
        let stdin = child.stdin.take().ok_or_else(|| capture_error("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| capture_error("stdout"))?;

        let channel = Arc::new(Channel {
            server: server.name.clone(),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            reader_alive: AtomicBool::new(true),
        });

        let reader_channel = Arc::clone(&channel);
        let reader = tokio::spawn(async move {
            reader_channel.reader_loop(stdout).await;
        })
        .abort_handle();

        debug!(
            server = %server.name,
            command = %server.command.display(),
            pid = ?child.id(),
            "Spawned MCP server process"
        );

        Ok(Self {
            channel,
            child: AsyncMutex::new(Some(child)),
            reader,
            call_timeout: server.call_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Run the `initialize` handshake followed by `notifications/initialized`.
    pub async fn initialize(&self, limit: Duration) -> Result<(), TransportError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "title": "toolrelay"
            },
            "capabilities": {}
        });

        let result = self
            .channel
            .send_request("initialize", params, limit)
            .await
            .map_err(|err| match err {
                TransportError::Rpc { server, message, .. } => TransportError::Handshake {
                    server,
                    reason: message,
                },
                TransportError::Timeout { server, after, .. } => TransportError::Handshake {
                    server,
                    reason: format!("no answer within {after:?}"),
                },
                other => other,
            })?;

        if !result.is_object() {
            return Err(TransportError::Handshake {
                server: self.channel.server.clone(),
                reason: format!("unexpected initialize result: {result}"),
            });
        }
        if let Some(text) = result.get("instructions").and_then(Value::as_str) {
            debug!(server = %self.channel.server, instructions = text, "Server instructions");
        }
        let server_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        self.channel
            .send_notification("notifications/initialized", json!({}))
            .await?;

        info!(
            server = %self.channel.server,
            protocol = server_version,
            "MCP session initialised"
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                server: self.channel.server.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    fn server_name(&self) -> &str {
        &self.channel.server
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.ensure_open()?;
        let server = &self.channel.server;
        // The whole listing shares one call_timeout budget.
        let deadline = Instant::now() + self.call_timeout;
        let mut tools = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_TOOL_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout {
                    server: server.clone(),
                    method: "tools/list".to_string(),
                    after: self.call_timeout,
                });
            }
            let result = self
                .channel
                .send_request("tools/list", params, remaining)
                .await?;
            tools.extend(parse_tool_page(server, &result)?);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(next) = &cursor else {
                debug!(server = %server, pages = page, tools = tools.len(), "Tool listing complete");
                return Ok(tools);
            };
            if !seen_cursors.insert(next.clone()) {
                return Err(TransportError::Malformed {
                    server: server.clone(),
                    reason: format!("tools/list repeated cursor '{next}'"),
                    payload: result,
                });
            }
        }

        Err(TransportError::Malformed {
            server: server.clone(),
            reason: format!("tools/list did not finish within {MAX_TOOL_PAGES} pages"),
            payload: json!({ "nextCursor": cursor }),
        })
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, TransportError> {
        self.ensure_open()?;
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let result = self
            .channel
            .send_request("tools/call", params, self.call_timeout)
            .await?;
        extract_tool_text(&self.channel.server, tool, result)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Closing stdin is the shutdown signal for stdio peers.
        self.channel.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.channel.server, %status, "MCP server exited");
                }
                Ok(Err(err)) => {
                    debug!(server = %self.channel.server, %err, "failed to reap MCP server process");
                }
                Err(_) => {
                    if let Err(err) = child.kill().await {
                        debug!(
                            server = %self.channel.server,
                            %err,
                            "failed to kill MCP server process (may have already exited)"
                        );
                    }
                }
            }
        }

        self.reader.abort();
        self.channel.fail_all_pending().await;
        info!(server = %self.channel.server, "MCP session closed");
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl Channel {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut reader = BufReader::new(stdout);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(server = %self.server, %err, "failed to read from MCP server stdout");
                    break;
                }
            }
            // Stray non-UTF-8 bytes from peer logging must not end the session.
            let raw = String::from_utf8_lossy(&buffer);
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    server = %self.server,
                    line = trimmed,
                    "skipping non-JSON ANSI log line from MCP server"
                );
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if let Err(err) = self.process_inbound_message(value).await {
                        warn!(
                            server = %self.server,
                            %err,
                            "failed to process message from MCP server"
                        );
                    }
                }
                Err(source) => {
                    warn!(
                        server = %self.server,
                        line = trimmed,
                        %source,
                        "received invalid JSON from MCP server"
                    );
                }
            }
        }

        debug!(server = %self.server, "MCP server stdout closed");
        self.reader_alive.store(false, Ordering::SeqCst);
        self.fail_all_pending().await;
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), TransportError> {
        match (value.get("id").cloned(), value.get("method").is_some()) {
            (Some(id), true) => self.handle_server_request(id, value).await,
            (Some(id), false) => {
                self.handle_response(id, value).await;
                Ok(())
            }
            (None, true) => {
                if let Some(method) = value.get("method").and_then(Value::as_str) {
                    debug!(
                        server = %self.server,
                        method,
                        "ignoring notification from server"
                    );
                }
                Ok(())
            }
            (None, false) => Ok(()),
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let Some(key) = response_key(&id) else {
            return;
        };

        let responder = self.pending.lock().await.remove(&key);
        let Some(sender) = responder else {
            debug!(
                server = %self.server,
                response_id = key,
                "received response for unknown request"
            );
            return;
        };

        let outcome = match value.get("error") {
            Some(error) => {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                Err(TransportError::Rpc {
                    server: self.server.clone(),
                    code,
                    message,
                })
            }
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    async fn handle_server_request(&self, id: Value, value: Value) -> Result<(), TransportError> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let response = match method {
            "ping" => RpcResponse::success(Some(id), json!({})),
            other => {
                warn!(
                    server = %self.server,
                    method = other,
                    "server sent unsupported request"
                );
                RpcResponse::method_not_found(Some(id), other)
            }
        };
        self.write_message(&response).await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        // Checked after registering so a reader exiting concurrently still
        // drains this request.
        if !self.reader_alive.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(TransportError::Terminated {
                server: self.server.clone(),
            });
        }

        if let Err(err) = self
            .write_message(&RpcRequest::new(id.clone(), method, params))
            .await
        {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match timeout(limit, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Cancelled {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(
                    server = %self.server,
                    method,
                    request_id = id.as_str(),
                    "MCP request timed out"
                );
                Err(TransportError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    after: limit,
                })
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.write_message(&RpcRequest::notification(method, params))
            .await
    }

    async fn write_message<T: serde::Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let encoded =
            serde_json::to_string(message).map_err(|source| TransportError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| TransportError::Closed {
            server: self.server.clone(),
        })?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        Ok(())
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(TransportError::Terminated {
                server: self.server.clone(),
            }));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn transport_error(&self, message: impl Into<String>) -> TransportError {
        TransportError::Transport {
            server: self.server.clone(),
            message: message.into(),
        }
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

fn parse_tool_page(server: &str, result: &Value) -> Result<Vec<ToolDescriptor>, TransportError> {
    let malformed = |reason: String, payload: &Value| TransportError::Malformed {
        server: server.to_string(),
        reason,
        payload: payload.clone(),
    };

    let items = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("tools/list result has no 'tools' array".into(), result))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<ToolDescriptor>(item.clone())
                .map_err(|err| malformed(format!("tool descriptor #{index}: {err}"), item))
        })
        .collect()
}

fn extract_tool_text(server: &str, tool: &str, result: Value) -> Result<String, TransportError> {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_error {
        let message = if texts.is_empty() {
            "tool reported an error without details".to_string()
        } else {
            texts.join("\n")
        };
        return Err(TransportError::ToolFailed {
            server: server.to_string(),
            tool: tool.to_string(),
            message,
        });
    }

    if texts.is_empty() {
        return Err(TransportError::Malformed {
            server: server.to_string(),
            reason: format!("tools/call result for '{tool}' has no text content"),
            payload: result,
        });
    }
    Ok(texts.join("\n"))
}

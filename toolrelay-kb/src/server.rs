//! Line-delimited JSON-RPC loop answering MCP requests from a registry.

use crate::registry::{ToolError, ToolRegistry};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use toolrelay_core::rpc::types::{JSONRPC_VERSION, MCP_PROTOCOL_VERSION};
use toolrelay_core::rpc::{RpcRequest, RpcResponse};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct McpServer {
    name: String,
    version: String,
    instructions: Option<String>,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            registry,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Serve until `input` reaches end of file.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = %self.name, tools = self.registry.len(), "Serving MCP over stdio");
        let mut lines = BufReader::new(input).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line) {
                write_response(&mut output, &response).await?;
            }
        }
        output.flush().await?;
        info!(server = %self.name, "Input closed, shutting down");
        Ok(())
    }

    /// Answer one inbound line. Notifications and stray responses yield
    /// nothing.
    pub fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                error!(%err, "Failed to parse inbound line");
                return Some(RpcResponse::parse_error(format!("Invalid JSON: {err}")));
            }
        };

        let id = value.get("id").cloned();
        if value.get("method").is_none() {
            if value.get("result").is_some() || value.get("error").is_some() {
                debug!(?id, "Ignoring response from client");
                return None;
            }
            return Some(RpcResponse::invalid_request(id, "missing 'method'"));
        }

        let request: RpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return Some(RpcResponse::invalid_request(id, err.to_string()));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(RpcResponse::invalid_request(
                request.id,
                format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        Some(self.dispatch(request))
    }

    fn handle_notification(&self, request: &RpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => info!("Client finished initialisation"),
            "notifications/cancelled" => debug!("Client cancelled a request"),
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            method, params, id, ..
        } = request;
        debug!(method = method.as_str(), ?id, "Handling request");
        match method.as_str() {
            "initialize" => RpcResponse::success(id, self.initialize_result()),
            "ping" => RpcResponse::success(id, json!({})),
            "tools/list" => {
                let tools = self.registry.descriptors();
                RpcResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => self.call_tool(id, params.unwrap_or(Value::Null)),
            other => {
                warn!(method = other, "Unsupported method");
                RpcResponse::method_not_found(id, other)
            }
        }
    }

    fn initialize_result(&self) -> Value {
        let mut result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.name, "version": self.version }
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        result
    }

    fn call_tool(&self, id: Option<Value>, params: Value) -> RpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::invalid_params(id, "tools/call requires a 'name'");
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args @ Value::Object(_)) => args.clone(),
            Some(other) => {
                return RpcResponse::invalid_params(
                    id,
                    format!("arguments for '{name}' must be an object, got {other}"),
                );
            }
        };
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return RpcResponse::invalid_params(id, format!("Unknown tool: {name}"));
        };

        info!(tool = name, "Calling tool");
        let result = match tool.call(&arguments) {
            Ok(text) => tool_result(text, false),
            Err(err) => {
                warn!(tool = name, error = %err, "Tool failed");
                let message = match &err {
                    ToolError::InvalidArguments(_) => format!("Error executing tool {name}: {err}"),
                    ToolError::Failed(message) => message.clone(),
                };
                tool_result(message, true)
            }
        };
        RpcResponse::success(id, result)
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

async fn write_response<W>(output: &mut W, response: &RpcResponse) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    output.write_all(&payload).await?;
    output.flush().await?;
    Ok(())
}

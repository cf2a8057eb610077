use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransportError;

/// A tool as advertised by the peer in `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "inputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// One live, initialised connection to a tool-providing peer.
///
/// A session serves a single request at a time and must be closed by its
/// owner; `close` is idempotent.
#[async_trait]
pub trait ToolSession: Send + Sync {
    fn server_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError>;

    /// Invoke `tool` and return the text it produced.
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, TransportError>;

    async fn close(&self);
}

/// Opens sessions. One orchestration cycle asks for exactly one session.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ToolSession>, TransportError>;
}

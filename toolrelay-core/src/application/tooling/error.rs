use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP server '{server}' rejected the handshake: {reason}")]
    Handshake { server: String, reason: String },
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("failed to encode message for MCP server '{server}': {source}")]
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
    #[error("MCP server '{server}' sent a malformed response: {reason}")]
    Malformed {
        server: String,
        reason: String,
        payload: Value,
    },
    #[error("tool '{tool}' on MCP server '{server}' reported failure: {message}")]
    ToolFailed {
        server: String,
        tool: String,
        message: String,
    },
    #[error("MCP server '{server}' did not answer '{method}' within {after:?}")]
    Timeout {
        server: String,
        method: String,
        after: Duration,
    },
    #[error("MCP server '{server}' terminated unexpectedly")]
    Terminated { server: String },
    #[error("MCP server '{server}' request cancelled")]
    Cancelled { server: String },
    #[error("session with MCP server '{server}' is closed")]
    Closed { server: String },
}

impl TransportError {
    /// The channel itself is unusable: the peer is gone or never came up.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransportError::Spawn { .. }
                | TransportError::Handshake { .. }
                | TransportError::Transport { .. }
                | TransportError::Terminated { .. }
                | TransportError::Cancelled { .. }
                | TransportError::Closed { .. }
        )
    }

    /// The peer answered, but not in a shape we can use.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TransportError::Malformed { .. } | TransportError::InvalidJson { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// Offending payload for protocol violations, for logging.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            TransportError::Malformed { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

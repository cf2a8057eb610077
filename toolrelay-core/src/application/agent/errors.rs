use crate::application::tooling::TransportError;
use crate::model::ModelError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Protocol,
    Backend,
    Argument,
    ToolExecution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Backend => "backend",
            ErrorKind::Argument => "argument",
            ErrorKind::ToolExecution => "tool_execution",
        };
        f.write_str(name)
    }
}

/// Why a query cycle failed. Every variant is fatal for the cycle; a caller
/// may start a new one.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("connection to tool server failed: {0}")]
    Connection(#[source] TransportError),
    #[error("protocol violation: {reason}")]
    Protocol {
        reason: String,
        payload: Option<Value>,
    },
    #[error("model backend failed: {0}")]
    Backend(#[from] ModelError),
    #[error("invalid arguments for tool '{tool}' (call '{call_id}'): {reason}")]
    Argument {
        tool: String,
        call_id: String,
        reason: String,
    },
    #[error("tool '{tool}' (call '{call_id}') failed: {source}")]
    ToolExecution {
        tool: String,
        call_id: String,
        #[source]
        source: TransportError,
    },
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CycleError::Connection(_) => ErrorKind::Connection,
            CycleError::Protocol { .. } => ErrorKind::Protocol,
            CycleError::Backend(_) => ErrorKind::Backend,
            CycleError::Argument { .. } => ErrorKind::Argument,
            CycleError::ToolExecution { .. } => ErrorKind::ToolExecution,
        }
    }

    pub fn protocol(reason: impl Into<String>, payload: Option<Value>) -> Self {
        Self::Protocol {
            reason: reason.into(),
            payload,
        }
    }

    /// Classify a failure while fetching the catalogue. Anything that is not
    /// a dead channel means the peer answered badly.
    pub(crate) fn from_listing(err: TransportError) -> Self {
        if err.is_connection_failure() || err.is_timeout() {
            Self::Connection(err)
        } else {
            Self::from_protocol_violation(err)
        }
    }

    pub(crate) fn from_call(tool: &str, call_id: &str, err: TransportError) -> Self {
        if err.is_connection_failure() {
            Self::Connection(err)
        } else if err.is_protocol_violation() {
            Self::from_protocol_violation(err)
        } else {
            Self::ToolExecution {
                tool: tool.to_string(),
                call_id: call_id.to_string(),
                source: err,
            }
        }
    }

    fn from_protocol_violation(err: TransportError) -> Self {
        Self::Protocol {
            payload: err.payload().cloned(),
            reason: err.to_string(),
        }
    }

    /// A tool call that ran out of time, as opposed to one the peer rejected.
    pub fn is_tool_timeout(&self) -> bool {
        matches!(self, CycleError::ToolExecution { source, .. } if source.is_timeout())
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            CycleError::Protocol { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CycleError::Connection(err) => {
                format!("Could not talk to the tool server: {err}")
            }
            CycleError::Protocol { reason, .. } => {
                format!("Received an unexpected response: {reason}")
            }
            CycleError::Backend(err) => err.user_message(),
            CycleError::Argument { tool, .. } => {
                format!("The model produced invalid arguments for tool \"{tool}\".")
            }
            CycleError::ToolExecution { tool, source, .. } => {
                if source.is_timeout() {
                    format!("Tool \"{tool}\" timed out.")
                } else {
                    format!("Tool \"{tool}\" failed: {source}")
                }
            }
        }
    }
}

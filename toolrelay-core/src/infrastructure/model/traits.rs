//! Model traits

use super::types::{ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;

/// A completion backend the orchestrator talks to.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend identifier used in logs and errors
    fn id(&self) -> &str;

    /// Send the conversation and tool catalogue, returning the assistant turn
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

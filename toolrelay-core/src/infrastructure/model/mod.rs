//! Model infrastructure module
//!
//! # Structure
//! - `types` - Request, Response, tool spec and Error types
//! - `traits` - the `ModelBackend` seam used by the orchestrator
//! - `clients` - HTTP client implementations

pub mod clients;
pub mod traits;
pub mod types;

pub use clients::OpenAIClient;
pub use traits::ModelBackend;
pub use types::{FunctionSpec, ModelError, ModelRequest, ModelResponse, ModelToolSpec, ToolChoice};

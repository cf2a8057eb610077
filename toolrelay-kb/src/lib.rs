//! Reference MCP peer: a stdio JSON-RPC server exposing a knowledge-base
//! lookup and a greeting generator.

pub mod registry;
pub mod server;
pub mod tools;

pub use registry::{Tool, ToolError, ToolRegistry};
pub use server::{McpServer, ServerError};
pub use tools::default_registry;

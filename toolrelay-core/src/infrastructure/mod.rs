//! Adapters to the outside world: the completion backend and JSON-RPC framing.

pub mod model;
pub mod rpc;

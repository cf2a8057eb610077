pub mod types;

pub use types::{RpcError, RpcRequest, RpcResponse};

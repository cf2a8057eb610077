//! Single-round tool orchestration between a chat-completion backend and a
//! stdio tool server.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, catalogue, tooling};
pub use config::AppConfig;
pub use domain::types;
pub use infrastructure::{model, rpc};

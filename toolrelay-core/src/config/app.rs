use super::error::ConfigError;
use super::model::ModelConfig;
use super::server::ServerConfig;
use std::path::Path;

/// Application configuration loaded from client.toml
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        super::loader::parse_config(content)
    }
}

use super::defaults::{
    DEFAULT_API_KEY_ENV, DEFAULT_API_PATH, DEFAULT_ENDPOINT, DEFAULT_MODEL,
    DEFAULT_MODEL_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::time::Duration;

/// Connection settings for the OpenAI-compatible completion endpoint.
///
/// ```toml
/// [model]
/// name = "openai/gpt-4o-mini"
/// endpoint = "https://openrouter.ai/api/v1"
/// api_key = "OPENROUTER_API_KEY"
/// ```
///
/// `api_key` names the environment variable holding the key, never the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub endpoint: String,
    pub api_path: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            api_key: Some(DEFAULT_API_KEY_ENV.to_string()),
            timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawModel {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub api_path: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

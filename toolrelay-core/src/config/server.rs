use super::defaults::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_SERVER_COMMAND,
    DEFAULT_SERVER_NAME,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How to launch the tool-providing peer and how long to wait on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            command: PathBuf::from(DEFAULT_SERVER_COMMAND),
            args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Point the server at a peer entry point. Python scripts are launched
    /// through the interpreter, anything else is executed directly.
    pub fn with_entry_point(mut self, path: &Path) -> Self {
        let is_python = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("py"));
        if is_python {
            self.command = PathBuf::from("python");
            self.args = vec![path.to_string_lossy().into_owned()];
        } else {
            self.command = path.to_path_buf();
            self.args = Vec::new();
        }
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawServer {
    pub name: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub workdir: Option<String>,
    pub handshake_timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

pub(crate) fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

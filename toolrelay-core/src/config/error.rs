use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("field 'model.name' must not be empty")]
    EmptyModel,

    #[error("field 'model.endpoint' must not be empty")]
    EmptyEndpoint,

    #[error("server '{server}' is missing required field 'command'")]
    MissingCommand { server: String },

    #[error("timeout '{field}' must be greater than zero")]
    ZeroTimeout { field: &'static str },
}

use super::defaults::{CONFIG_PATH, ENV_PATH};
use super::error::ConfigError;
use super::model::{ModelConfig, RawModel};
use super::server::{RawServer, ServerConfig, expand};
use dotenvy::{dotenv, from_filename};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub model: RawModel,
    #[serde(default)]
    pub server: RawServer,
}

/// Ensures environment variables are loaded from `.env` and `config/.env`
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = dotenv();
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration.
///
/// An explicit path must exist. Without one the default path is tried and
/// built-in defaults are used when it is absent.
pub fn load_config(path: Option<&Path>) -> Result<super::AppConfig, ConfigError> {
    ensure_env_loaded();
    match path {
        Some(path) => read_config(path),
        None => {
            let default_path = Path::new(CONFIG_PATH);
            match read_config(default_path) {
                Err(ConfigError::NotFound { .. }) => {
                    debug!(
                        path = %default_path.display(),
                        "No configuration file found, using built-in defaults"
                    );
                    validate_and_build(RawConfig::default())
                }
                other => other,
            }
        }
    }
}

/// Parse configuration from TOML text without touching the filesystem.
pub fn parse_config(content: &str) -> Result<super::AppConfig, ConfigError> {
    let parsed: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    validate_and_build(parsed)
}

fn read_config(path: &Path) -> Result<super::AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<super::AppConfig, ConfigError> {
    let model = build_model(parsed.model)?;
    let server = build_server(parsed.server)?;
    Ok(super::AppConfig { model, server })
}

fn build_model(raw: RawModel) -> Result<ModelConfig, ConfigError> {
    let defaults = ModelConfig::default();

    let name = raw.name.unwrap_or(defaults.name);
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyModel);
    }
    let endpoint = raw.endpoint.unwrap_or(defaults.endpoint);
    if endpoint.trim().is_empty() {
        return Err(ConfigError::EmptyEndpoint);
    }
    let timeout = seconds(raw.timeout_secs, defaults.timeout, "model.timeout_secs")?;

    // An explicitly empty `api_key` disables bearer auth (local endpoints).
    let api_key = match raw.api_key {
        Some(var) if var.trim().is_empty() => None,
        Some(var) => Some(var),
        None => defaults.api_key,
    };

    Ok(ModelConfig {
        name,
        endpoint,
        api_path: raw.api_path.unwrap_or(defaults.api_path),
        api_key,
        timeout,
    })
}

fn build_server(raw: RawServer) -> Result<ServerConfig, ConfigError> {
    let defaults = ServerConfig::default();
    let name = raw.name.unwrap_or(defaults.name);

    let command = match raw.command {
        Some(command) if command.trim().is_empty() => {
            return Err(ConfigError::MissingCommand { server: name });
        }
        Some(command) => PathBuf::from(expand(&command)),
        None => defaults.command,
    };

    Ok(ServerConfig {
        command,
        args: raw.args.iter().map(|arg| expand(arg)).collect(),
        env: raw.env,
        workdir: raw.workdir.map(|dir| PathBuf::from(expand(&dir))),
        handshake_timeout: seconds(
            raw.handshake_timeout_secs,
            defaults.handshake_timeout,
            "server.handshake_timeout_secs",
        )?,
        call_timeout: seconds(
            raw.call_timeout_secs,
            defaults.call_timeout,
            "server.call_timeout_secs",
        )?,
        name,
    })
}

fn seconds(
    value: Option<u64>,
    default: Duration,
    field: &'static str,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::ZeroTimeout { field }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

pub const DEFAULT_CONFIG_PATH: &str = "config/client.toml";
pub const CONFIG_PATH: &str = DEFAULT_CONFIG_PATH;
pub const ENV_PATH: &str = "config/.env";

pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct:free";
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_API_PATH: &str = "chat/completions";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_SERVER_NAME: &str = "knowledge-base";
pub const DEFAULT_SERVER_COMMAND: &str = "toolrelay-kb";
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

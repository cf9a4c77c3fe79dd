use std::{fmt, net::SocketAddr, time::Duration};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
pub const DEFAULT_NARRATION_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const ENV_GEMINI_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_BIND_ADDR: &str = "NARRATOR_BIND_ADDR";
pub const ENV_VOICE_ID: &str = "NARRATOR_VOICE_ID";
pub const ENV_MODEL_ID: &str = "NARRATOR_MODEL_ID";
pub const ENV_NARRATION_MODEL: &str = "NARRATOR_NARRATION_MODEL";

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

/// Both upstream credentials. Resolution is eager: a missing key fails
/// configuration before any client is constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiCredentials {
    pub narration: ApiKey,
    pub synthesis: ApiKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub credentials: ApiCredentials,
    pub bind_addr: SocketAddr,
    pub voice_id: String,
    pub model_id: String,
    pub narration_model: String,
    pub connect_timeout: Duration,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("missing required api key: set {0} or pass the matching flag")]
    MissingApiKey(&'static str),
    #[error("invalid bind address {0:?}")]
    InvalidBindAddr(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn require_api_key(
    cli_value: Option<String>,
    env_key: &'static str,
    env: &impl Env,
) -> Result<ApiKey, ConfigError> {
    match cli_value {
        Some(v) => ApiKey::new(v),
        None => match env.var(env_key) {
            Some(v) => ApiKey::new(v),
            None => Err(ConfigError::MissingApiKey(env_key)),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn parse_bind_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidBindAddr(value.to_owned()))
}

//! Configuration parsing and validation for aigrader.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

use crate::gateway::{DEFAULT_MAX_TOKENS, DEFAULT_TIMEOUT_SECS};

/// Environment variable holding the chat completions endpoint.
pub const API_URL_ENV: &str = "OPENAI_COMPATIBLE_API_URL";
/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_COMPATIBLE_API_KEY";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:5000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Origins allowed to call `/api/*`; `"*"` allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Upstream LLM configuration.
///
/// `api_url` and `api_key` stay `None` when unset; the gateway then reports
/// every call as unconfigured instead of refusing to start.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Full chat completions URL (e.g., "https://api.example.com/v1/chat/completions")
    pub api_url: Option<String>,
    pub api_key: Option<ApiKey>,
    /// Model used for grading and answer analysis
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Both endpoint and key are present and non-empty.
    pub fn is_configured(&self) -> bool {
        let has_url = self.api_url.as_deref().is_some_and(|u| !u.is_empty());
        let has_key = self
            .api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty());
        has_url && has_key
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How a value was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// Literal string in the config file
    Literal,
    /// Config value contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Taken from a well-known env var (holds var name)
    EnvOverride(String),
    /// Not set anywhere
    None,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Literal => write!(f, "config-literal"),
            ValueSource::EnvExpanded => write!(f, "env-expanded"),
            ValueSource::EnvOverride(var) => write!(f, "env ({})", var),
            ValueSource::None => write!(f, "none"),
        }
    }
}

/// Where the endpoint and the key came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sources {
    pub api_url: ValueSource,
    pub api_key: ValueSource,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Raw LLM section; string values may contain `${VAR}` references.
#[derive(Deserialize, Default)]
pub struct RawLlmConfig {
    api_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    llm: RawLlmConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple references in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value for '{}'", field),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in '{}')",
                var_name, field
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve one optional value: env override first, then the (expanded) file value.
fn resolve_with<F>(
    raw: Option<String>,
    field: &str,
    override_var: &str,
    lookup: &F,
) -> Result<(Option<String>, ValueSource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(override_var).filter(|v| !v.is_empty()) {
        return Ok((Some(value), ValueSource::EnvOverride(override_var.to_string())));
    }

    match raw {
        Some(value) if value.contains("${") => {
            let expanded = expand_env_vars_with(&value, field, lookup)?;
            Ok((Some(expanded), ValueSource::EnvExpanded))
        }
        Some(value) if !value.is_empty() => Ok((Some(value), ValueSource::Literal)),
        _ => Ok((None, ValueSource::None)),
    }
}

impl Config {
    /// Parse configuration from a TOML string, without environment lookups.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        let (config, _) = Self::from_raw_with(raw, |_| None)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert raw config to final config, resolving values through `lookup`.
    ///
    /// For `api_url` and `api_key`:
    /// - A non-empty `OPENAI_COMPATIBLE_API_*` variable wins (`EnvOverride`)
    /// - Else `${VAR}` references are expanded (`EnvExpanded`)
    /// - Else a literal file value is used (`Literal`), or nothing (`None`)
    pub fn from_raw_with<F>(raw: RawConfig, lookup: F) -> Result<(Self, Sources), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (api_url, url_source) = resolve_with(raw.llm.api_url, "llm.api_url", API_URL_ENV, &lookup)?;
        let (api_key, key_source) = resolve_with(raw.llm.api_key, "llm.api_key", API_KEY_ENV, &lookup)?;

        let config = Config {
            server: raw.server,
            llm: LlmConfig {
                api_url,
                api_key: api_key.map(ApiKey::from),
                model: raw.llm.model.unwrap_or_else(default_model),
                max_tokens: raw.llm.max_tokens.unwrap_or_else(default_max_tokens),
                timeout_secs: raw.llm.timeout_secs.unwrap_or_else(default_timeout_secs),
            },
        };

        let sources = Sources {
            api_url: url_source,
            api_key: key_source,
        };

        Ok((config, sources))
    }

    /// Load configuration with environment variable expansion and overrides.
    ///
    /// A missing file is not an error: defaults plus environment are used.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Sources), ConfigError> {
        let path = path.as_ref();
        let raw: RawConfig = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                RawConfig::default()
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let (config, sources) = Self::from_raw_with(raw, |name| std::env::var(name).ok())?;
        config.validate()?;

        Ok((config, sources))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.model must not be empty".to_string(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "llm.max_tokens must be positive".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be positive".to_string(),
            ));
        }

        if !self.llm.is_configured() {
            tracing::warn!(
                "LLM endpoint or API key not configured - grading requests will be rejected"
            );
        }

        Ok(())
    }
}

//! Configuration loading, validation, and management for relaybot.
//!
//! Loads configuration from `$RELAYBOT_CONFIG` or `~/.relaybot/config.toml`,
//! then applies environment variable overrides. Validates all settings once
//! at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.relaybot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion provider API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens per completion; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// File holding the preamble text; built-in preamble when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamble_file: Option<PathBuf>,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    #[serde(default)]
    pub discord: DiscordSettings,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("preamble_file", &self.preamble_file)
            .field("history", &self.history)
            .field("attachments", &self.attachments)
            .field("discord", &self.discord)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Conversation history and completion loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of history messages exposed to the provider (K)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Upper bound on tool-call rounds per reply
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Posts that may wait per conversation before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_buffer_size() -> usize {
    6
}
fn default_max_tool_rounds() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    16
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_tool_rounds: default_max_tool_rounds(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Character budget for all attachments of one post
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
}

fn default_char_budget() -> usize {
    30_000
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            char_budget: default_char_budget(),
        }
    }
}

/// Discord connection settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DiscordSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// The single channel the bot answers in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,

    /// The bot's own user ID; looked up via the API when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    /// HMAC secret of the inbound event relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_secret: Option<String>,
}

impl std::fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("channel_id", &self.channel_id)
            .field("bot_user_id", &self.bot_user_id)
            .field("relay_secret", &redact(&self.relay_secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location plus the process
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("RELAYBOT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY").or_else(|| get("RELAYBOT_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_API_MODEL") {
            self.model = model;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.api_url = url;
        }
        if let Some(raw) = get("MESSAGE_BUFFER_SIZE") {
            self.history.buffer_size = parse_var("MESSAGE_BUFFER_SIZE", &raw)?;
        }
        if let Some(raw) = get("MAX_TOOL_ROUNDS") {
            self.history.max_tool_rounds = parse_var("MAX_TOOL_ROUNDS", &raw)?;
        }
        if let Some(raw) = get("FILE_LENGTH_LIMIT") {
            self.attachments.char_budget = parse_var("FILE_LENGTH_LIMIT", &raw)?;
        }
        if let Some(path) = get("SYSTEM_PROMPT_FILE") {
            self.preamble_file = Some(PathBuf::from(path));
        }
        if let Some(token) = get("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = Some(token);
        }
        if let Some(raw) = get("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = Some(parse_var("DISCORD_CHANNEL_ID", &raw)?);
        }
        if let Some(id) = get("DISCORD_BOT_USER_ID") {
            self.discord.bot_user_id = Some(id);
        }
        if let Some(secret) = get("DISCORD_RELAY_SECRET") {
            self.discord.relay_secret = Some(secret);
        }
        if let Some(raw) = get("PORT") {
            self.gateway.port = parse_var("PORT", &raw)?;
        }
        if let Some(host) = get("RELAYBOT_HOST") {
            self.gateway.host = host;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".relaybot")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if self.history.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.history.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or an error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    /// Bot token and channel ID, both required to serve Discord.
    pub fn require_discord(&self) -> Result<(&str, u64), ConfigError> {
        let token = self
            .discord
            .bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("DISCORD_BOT_TOKEN"))?;
        let channel_id = self
            .discord
            .channel_id
            .ok_or(ConfigError::Missing("DISCORD_CHANNEL_ID"))?;
        Ok((token, channel_id))
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: None,
            max_tokens: None,
            preamble_file: None,
            history: HistoryConfig::default(),
            attachments: AttachmentConfig::default(),
            discord: DiscordSettings::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value for {name} ({value:?}): {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

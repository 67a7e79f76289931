//! Configuration management for the relay bot.
//!
//! The bot reads an optional JSON file at `~/.relay-bot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `OPENROUTER_API_KEY` → llm.api_key
//! - `AI_MODEL` → llm.model
//! - `AI_MAX_TOKENS` → llm.max_tokens
//! - `AI_TEMPERATURE` → llm.temperature
//! - `AI_TIMEOUT_SECS` → llm.timeout_secs
//! - `MAX_CONTEXT_MESSAGES` → session.max_context_messages
//! - `DEFAULT_LANGUAGE` → session.default_language
//! - `LOG_LEVEL` → observability.log_level
//! - `LOG_FORMAT` → observability.log_format

use crate::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay-bot"),
        |dirs| dirs.home_dir().join(".relay-bot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// System instruction prepended to every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant in a Telegram bot. \
Your job is to help users with their questions and to be friendly and informative.

Rules:
- Answer in Russian if the user writes in Russian
- Answer in English if the user writes in English
- Be polite and professional
- Give short, clear answers
- If you don't know the answer, say so honestly
- Never use obscene language";

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Usernames or numeric ids allowed to talk to the bot ("*" = everyone)
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Size budget (characters) for one outgoing message part
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout_secs(),
            max_message_len: default_max_message_len(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_max_message_len() -> usize {
    4090
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Remote completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Bearer token for the completion API
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Upper bound for one completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fixed system instruction
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_model() -> String {
    "deepseek/deepseek-chat".into()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of most recent turns sent as context
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,

    /// Language used when the client supplies none or an unsupported one
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_context_messages: default_max_context_messages(),
            default_language: default_language(),
        }
    }
}

fn default_max_context_messages() -> usize {
    10
}

fn default_language() -> String {
    "ru".into()
}

// ============================================================================
// Content Filter Configuration
// ============================================================================

/// Inbound/outbound content filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Run the profanity lexicon (length checks always run)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum inbound message length in characters
    #[serde(default = "default_max_inbound_len")]
    pub max_message_len: usize,

    /// Additional words appended to the built-in lexicon
    #[serde(default)]
    pub extra_words: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_len: default_max_inbound_len(),
            extra_words: Vec::new(),
        }
    }
}

fn default_max_inbound_len() -> usize {
    4000
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the relay bot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup("AI_MODEL") {
            self.llm.model = model;
        }
        parse_into(&lookup, "AI_MAX_TOKENS", &mut self.llm.max_tokens);
        parse_into(&lookup, "AI_TEMPERATURE", &mut self.llm.temperature);
        parse_into(&lookup, "AI_TIMEOUT_SECS", &mut self.llm.timeout_secs);
        parse_into(
            &lookup,
            "MAX_CONTEXT_MESSAGES",
            &mut self.session.max_context_messages,
        );
        if let Some(lang) = lookup("DEFAULT_LANGUAGE") {
            self.session.default_language = lang;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.observability.log_level = level.to_lowercase();
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.observability.log_format = format.to_lowercase();
        }
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(variable = key, value = %raw, "Ignoring unparsable override"),
    }
}

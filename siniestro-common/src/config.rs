//! Configuration management for Siniestro services.
//!
//! All Siniestro services share a unified configuration file at
//! `~/.siniestro/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (SINIESTRO_* prefix)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SINIESTRO_PORT` → server.port
//! - `SINIESTRO_BIND_ADDRESS` → server.host
//! - `SINIESTRO_LOG_LEVEL` → observability.log_level
//! - `SINIESTRO_INSTRUCTIONS_URL` → chat.instructions_url
//! - `SINIESTRO_COMPLETION_ENDPOINT` → chat.completion.endpoint
//! - `SINIESTRO_MODEL` → chat.completion.model
//! - `SINIESTRO_TELEGRAM_BOT` → qr.telegram_bot
//! - `OPENAI_API_KEY` → chat.completion.api_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".siniestro"),
        |dirs| dirs.home_dir().join(".siniestro"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
///
/// Default bind is `127.0.0.1` (local only). Set to `0.0.0.0` for remote
/// access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================================================
// Chat Configuration
// ============================================================================

/// Chat proxy configuration (session store + upstream collaborators).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// URL of the plain-text instructions document fetched at startup
    /// and on reload. Its content seeds every session's system message.
    #[serde(default)]
    pub instructions_url: String,

    /// Completion collaborator settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Session key used when a request carries no `session` field.
    #[serde(default = "default_session_key")]
    pub default_session: String,

    /// Sessions idle longer than this are trimmed to system-only history.
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,

    /// Interval between eviction sweeps.
    #[serde(default = "default_sweep_minutes")]
    pub sweep_minutes: u64,

    /// Optional defensive cap on per-session history length.
    /// `None` preserves unbounded growth between sweeps.
    #[serde(default)]
    pub max_history: Option<usize>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            instructions_url: String::new(),
            completion: CompletionConfig::default(),
            default_session: default_session_key(),
            idle_minutes: default_idle_minutes(),
            sweep_minutes: default_sweep_minutes(),
            max_history: None,
        }
    }
}

/// Completion collaborator configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Full URL of the chat-completions endpoint.
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    /// Bearer token for the endpoint, if it requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier sent with every completion request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

// ============================================================================
// QR Configuration
// ============================================================================

/// QR deep-link generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// Telegram bot username used in `t.me` deep links (without `@`).
    #[serde(default = "default_telegram_bot")]
    pub telegram_bot: String,

    /// Minimum rendered image dimension in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            telegram_bot: default_telegram_bot(),
            image_size: default_image_size(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Aliases: "level" for backward compatibility with existing config files
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    /// Aliases: "format" for backward compatibility with existing config files
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

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure for the Siniestro services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat proxy configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// QR deep-link configuration
    #[serde(default)]
    pub qr: QrConfig,

    /// Observability configuration
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

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("SINIESTRO_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(bind) = std::env::var("SINIESTRO_BIND_ADDRESS") {
            self.server.host = bind;
        }
        if let Ok(level) = std::env::var("SINIESTRO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(url) = std::env::var("SINIESTRO_INSTRUCTIONS_URL") {
            self.chat.instructions_url = url;
        }
        if let Ok(endpoint) = std::env::var("SINIESTRO_COMPLETION_ENDPOINT") {
            self.chat.completion.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("SINIESTRO_MODEL") {
            self.chat.completion.model = model;
        }
        if let Ok(bot) = std::env::var("SINIESTRO_TELEGRAM_BOT") {
            self.qr.telegram_bot = bot;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.chat.completion.api_key = Some(key);
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        let dir = config_dir();

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Effective bind address for the HTTP server.
    pub fn bind_address(&self) -> &str {
        &self.server.host
    }

    /// Idle threshold for the eviction sweep, in milliseconds.
    pub fn idle_ttl_ms(&self) -> i64 {
        (self.chat.idle_minutes as i64) * 60_000
    }

    /// Interval between eviction sweeps.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chat.sweep_minutes * 60)
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4440
}
fn default_session_key() -> String {
    "global".into()
}
fn default_idle_minutes() -> u64 {
    30
}
fn default_sweep_minutes() -> u64 {
    5
}
fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_completion_timeout() -> u64 {
    300 // completions against large models can be slow
}
fn default_telegram_bot() -> String {
    "SiniestroBot".into()
}
fn default_image_size() -> u32 {
    256
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 4440);
        assert_eq!(config.bind_address(), "127.0.0.1");
        assert_eq!(config.chat.default_session, "global");
        assert_eq!(config.chat.idle_minutes, 30);
        assert_eq!(config.chat.sweep_minutes, 5);
        assert!(config.chat.max_history.is_none());
        assert_eq!(config.chat.completion.model, "gpt-4o");
        assert_eq!(config.qr.telegram_bot, "SiniestroBot");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_derived_intervals() {
        let config = Config::default();
        assert_eq!(config.idle_ttl_ms(), 30 * 60_000);
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(300));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.chat.completion.model, config.chat.completion.model);
        assert_eq!(parsed.qr.telegram_bot, config.qr.telegram_bot);
    }

    #[test]
    fn test_partial_config_deserialization() {
        // Partial JSON keeps defaults for everything absent
        let json = r#"{"server": {"port": 8080}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.bind_address(), "127.0.0.1"); // default
        assert_eq!(config.chat.idle_minutes, 30); // default
    }

    #[test]
    fn test_chat_config() {
        let json = r#"{
            "chat": {
                "instructions_url": "https://example.com/instructions.txt",
                "default_session": "deyna",
                "idle_minutes": 10,
                "max_history": 40,
                "completion": {
                    "endpoint": "http://localhost:9000/v1/chat/completions",
                    "model": "gpt-4o-mini",
                    "timeout_secs": 30
                }
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.chat.instructions_url,
            "https://example.com/instructions.txt"
        );
        assert_eq!(config.chat.default_session, "deyna");
        assert_eq!(config.chat.idle_minutes, 10);
        assert_eq!(config.chat.max_history, Some(40));
        assert_eq!(config.chat.completion.model, "gpt-4o-mini");
        assert_eq!(config.chat.completion.timeout_secs, 30);
        assert!(config.chat.completion.api_key.is_none());
    }

    #[test]
    fn test_observability_aliases() {
        // Old config files used "level"/"format"
        let json = r#"{"observability": {"level": "debug", "format": "json"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"server": {"host": "0.0.0.0", "port": 9999}, "qr": {"telegram_bot": "MiBot"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.qr.telegram_bot, "MiBot");
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();

        std::env::set_var("SINIESTRO_PORT", "7777");
        std::env::set_var("SINIESTRO_INSTRUCTIONS_URL", "https://example.com/i.txt");
        std::env::set_var("SINIESTRO_MODEL", "gpt-4.1");
        std::env::set_var("OPENAI_API_KEY", "sk-test-123");
        config.apply_env_overrides();
        std::env::remove_var("SINIESTRO_PORT");
        std::env::remove_var("SINIESTRO_INSTRUCTIONS_URL");
        std::env::remove_var("SINIESTRO_MODEL");
        std::env::remove_var("OPENAI_API_KEY");

        assert_eq!(config.server.port, 7777);
        assert_eq!(config.chat.instructions_url, "https://example.com/i.txt");
        assert_eq!(config.chat.completion.model, "gpt-4.1");
        assert_eq!(config.chat.completion.api_key, Some("sk-test-123".into()));
    }
}

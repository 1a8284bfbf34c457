//! Configuration loading, validation, and management for Steward.
//!
//! Loads configuration from `~/.steward/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The config is the *desired state*: the assistant and data files listed
//! here are what `steward sync` reconciles the remote service toward.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use steward_core::remote::{Metadata, Region};

/// Chat models the assistant API accepts.
/// Longest conversation history lifetime accepted: 30 days.
pub const MAX_CONVERSATION_TTL_SECS: u64 = 30 * 24 * 3600;

/// Longest chat round trip accepted: 10 minutes.
pub const MAX_CHAT_TIMEOUT_SECS: u64 = 600;

pub const SUPPORTED_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4.1",
    "o4-mini",
    "claude-3-5-sonnet",
    "claude-3-7-sonnet",
    "gemini-2.5-pro",
];

/// The root configuration structure.
///
/// Maps directly to `~/.steward/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pinecone API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Control-plane URL override (defaults to the public Pinecone API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Where observed signals are persisted between runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// The managed assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<AssistantConfig>,

    /// Managed data files attached to an assistant
    #[serde(default)]
    pub data_files: Vec<DataFileConfig>,

    /// Chat defaults
    #[serde(default)]
    pub chat: ChatConfig,

    /// Re-invocation delays
    #[serde(default)]
    pub timing: TimingConfig,
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
            .field("state_path", &self.state_path)
            .field("assistant", &self.assistant)
            .field("data_files", &self.data_files)
            .field("chat", &self.chat)
            .field("timing", &self.timing)
            .finish()
    }
}

/// Desired state of the managed assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Assistant name (fixed: renaming means a different assistant)
    pub name: String,

    pub instructions: String,

    /// Deployment region (fixed after creation)
    #[serde(default)]
    pub region: Region,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Desired state of one managed data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFileConfig {
    /// Stable key identifying this resource in the signal store
    pub key: String,

    /// Assistant to attach to; defaults to `[assistant].name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,

    /// Inline content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Content read from a local file instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,

    /// Filename used for the upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl DataFileConfig {
    /// The declared content, reading `content_path` if that is what was given.
    pub fn resolve_content(&self) -> Result<String, ConfigError> {
        match (&self.content, &self.content_path) {
            (Some(content), None) => Ok(content.clone()),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            }),
            _ => Err(ConfigError::ValidationError(format!(
                "data file '{}' needs exactly one of content or content_path",
                self.key
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Assistant to chat with; defaults to `[assistant].name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Lifetime of stored conversation history
    #[serde(default = "default_conversation_ttl")]
    pub ttl_secs: u64,

    /// Bound on a single chat round trip
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum context snippets (1 to 64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Maximum size of each context snippet, in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_size: Option<u32>,

    #[serde(default)]
    pub json_response: bool,

    #[serde(default)]
    pub include_highlights: bool,
}

fn default_model() -> String {
    "gpt-4o".into()
}
fn default_conversation_ttl() -> u64 {
    3600
}
fn default_chat_timeout() -> u64 {
    30
}

impl ChatConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            assistant: None,
            model: default_model(),
            ttl_secs: default_conversation_ttl(),
            timeout_secs: default_chat_timeout(),
            temperature: None,
            top_k: None,
            snippet_size: None,
            json_response: false,
            include_highlights: false,
        }
    }
}

/// Fixed re-invocation delays, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_assistant_poll")]
    pub assistant_poll_secs: u64,

    #[serde(default = "default_file_poll")]
    pub file_poll_secs: u64,

    #[serde(default = "default_upload_initial")]
    pub upload_initial_secs: u64,

    #[serde(default = "default_file_poll")]
    pub upload_poll_secs: u64,
}

fn default_assistant_poll() -> u64 {
    10
}
fn default_file_poll() -> u64 {
    15
}
fn default_upload_initial() -> u64 {
    5
}

impl TimingConfig {
    pub fn assistant_poll(&self) -> Duration {
        Duration::from_secs(self.assistant_poll_secs)
    }

    pub fn file_poll(&self) -> Duration {
        Duration::from_secs(self.file_poll_secs)
    }

    pub fn upload_initial(&self) -> Duration {
        Duration::from_secs(self.upload_initial_secs)
    }

    pub fn upload_poll(&self) -> Duration {
        Duration::from_secs(self.upload_poll_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            assistant_poll_secs: default_assistant_poll(),
            file_poll_secs: default_file_poll(),
            upload_initial_secs: default_upload_initial(),
            upload_poll_secs: default_file_poll(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.steward/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path, then apply
    /// environment overrides.
    ///
    /// API key environment variables, highest priority first:
    /// - `STEWARD_API_KEY`
    /// - `PINECONE_API_KEY`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("STEWARD_API_KEY")
                .ok()
                .or_else(|| std::env::var("PINECONE_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("STEWARD_API_URL") {
            config.api_url = Some(url);
        }

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".steward")
    }

    /// Where signals are persisted unless `state_path` says otherwise.
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("state.json"))
    }

    /// The assistant chat and data files target when they don't name one.
    pub fn default_assistant_name(&self) -> Option<&str> {
        self.assistant.as_ref().map(|a| a.name.as_str())
    }

    /// Assistant a data file is attached to.
    pub fn data_file_assistant<'a>(&'a self, file: &'a DataFileConfig) -> Option<&'a str> {
        file.assistant.as_deref().or_else(|| self.default_assistant_name())
    }

    /// Assistant the chat actions talk to.
    pub fn chat_assistant(&self) -> Option<&str> {
        self.chat.assistant.as_deref().or_else(|| self.default_assistant_name())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(assistant) = &self.assistant
            && assistant.name.trim().is_empty()
        {
            return Err(ConfigError::ValidationError("assistant.name must not be empty".into()));
        }

        if !SUPPORTED_MODELS.contains(&self.chat.model.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "chat.model '{}' is not one of: {}",
                self.chat.model,
                SUPPORTED_MODELS.join(", ")
            )));
        }

        if let Some(t) = self.chat.temperature
            && !(0.0..=1.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if let Some(k) = self.chat.top_k
            && !(1..=64).contains(&k)
        {
            return Err(ConfigError::ValidationError("chat.top_k must be between 1 and 64".into()));
        }

        if !(1..=MAX_CONVERSATION_TTL_SECS).contains(&self.chat.ttl_secs) {
            return Err(ConfigError::ValidationError(format!(
                "chat.ttl_secs must be between 1 and {MAX_CONVERSATION_TTL_SECS}"
            )));
        }

        if !(1..=MAX_CHAT_TIMEOUT_SECS).contains(&self.chat.timeout_secs) {
            return Err(ConfigError::ValidationError(format!(
                "chat.timeout_secs must be between 1 and {MAX_CHAT_TIMEOUT_SECS}"
            )));
        }

        let mut keys = HashSet::new();
        for file in &self.data_files {
            if !keys.insert(file.key.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate data file key '{}'",
                    file.key
                )));
            }
            if file.content.is_some() == file.content_path.is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "data file '{}' needs exactly one of content or content_path",
                    file.key
                )));
            }
            if self.data_file_assistant(file).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "data file '{}' has no assistant and no [assistant] section is configured",
                    file.key
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self {
            assistant: Some(AssistantConfig {
                name: "my-assistant".into(),
                instructions: "Answer questions using the uploaded documents.".into(),
                region: Region::Us,
                metadata: Metadata::new(),
            }),
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            state_path: None,
            assistant: None,
            data_files: vec![],
            chat: ChatConfig::default(),
            timing: TimingConfig::default(),
        }
    }
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

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
api_key = "pc-test"

[assistant]
name = "docs-bot"
instructions = "Answer from the handbook."
region = "eu"
[assistant.metadata]
team = "search"

[[data_files]]
key = "handbook"
content = "Welcome aboard."
filename = "handbook.txt"
[data_files.metadata]
kind = "policy"

[chat]
model = "claude-3-7-sonnet"
ttl_secs = 600
top_k = 8

[timing]
file_poll_secs = 5
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.timing.assistant_poll(), Duration::from_secs(10));
        assert_eq!(config.timing.file_poll(), Duration::from_secs(15));
        assert_eq!(config.timing.upload_initial(), Duration::from_secs(5));
    }

    #[test]
    fn parses_full_sample() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        let assistant = config.assistant.as_ref().unwrap();
        assert_eq!(assistant.name, "docs-bot");
        assert_eq!(assistant.region, Region::Eu);
        assert_eq!(assistant.metadata.get("team").map(String::as_str), Some("search"));

        assert_eq!(config.data_files.len(), 1);
        assert_eq!(config.data_file_assistant(&config.data_files[0]), Some("docs-bot"));
        assert_eq!(config.chat_assistant(), Some("docs-bot"));
        assert_eq!(config.chat.ttl(), Duration::from_secs(600));
        assert_eq!(config.timing.file_poll_secs, 5);
        assert_eq!(config.timing.assistant_poll_secs, 10);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("pc-test"));
    }

    #[test]
    fn unsupported_model_rejected() {
        let config = AppConfig {
            chat: ChatConfig {
                model: "gpt-2".into(),
                ..ChatConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn chat_durations_are_bounded() {
        let toml_str = r#"
[chat]
ttl_secs = 9223372036854775807
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chat.ttl_secs"));

        for (ttl_secs, timeout_secs) in [(0, 30), (3600, 0), (3600, 100_000)] {
            let config = AppConfig {
                chat: ChatConfig {
                    ttl_secs,
                    timeout_secs,
                    ..ChatConfig::default()
                },
                ..AppConfig::default()
            };
            assert!(config.validate().is_err(), "ttl {ttl_secs} timeout {timeout_secs}");
        }

        let config = AppConfig {
            chat: ChatConfig {
                ttl_secs: MAX_CONVERSATION_TTL_SECS,
                timeout_secs: MAX_CHAT_TIMEOUT_SECS,
                ..ChatConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn data_file_without_assistant_rejected() {
        let config = AppConfig {
            data_files: vec![DataFileConfig {
                key: "orphan".into(),
                assistant: None,
                content: Some("x".into()),
                content_path: None,
                filename: None,
                metadata: Metadata::new(),
            }],
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn duplicate_data_file_keys_rejected() {
        let file = DataFileConfig {
            key: "dup".into(),
            assistant: Some("bot".into()),
            content: Some("x".into()),
            content_path: None,
            filename: None,
            metadata: Metadata::new(),
        };
        let config = AppConfig {
            data_files: vec![file.clone(), file],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn content_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Title").unwrap();

        let file = DataFileConfig {
            key: "doc".into(),
            assistant: Some("bot".into()),
            content: None,
            content_path: Some(path),
            filename: Some("doc.md".into()),
            metadata: Metadata::new(),
        };
        assert_eq!(file.resolve_content().unwrap(), "# Title");
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert!(result.unwrap().assistant.is_none());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("my-assistant"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
    }
}

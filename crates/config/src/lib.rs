//! Configuration loading, validation, and management for markwright.
//!
//! Loads configuration from `~/.markwright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.markwright/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job scheduler settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Reasoning loop settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// HTTP status gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Jobs allowed to run at once across the whole process
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Cap on waiting jobs; unset means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,

    /// Buffered status events per subscriber before it starts lagging
    #[serde(default = "default_status_channel_capacity")]
    pub status_channel_capacity: usize,
}

fn default_max_concurrent() -> usize {
    2
}
fn default_status_channel_capacity() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_pending: None,
            status_channel_capacity: default_status_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Exploration rounds before finalization is forced
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Default sampling temperature (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Default max tokens per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Instruction appended before the finalization round
    #[serde(default = "default_finalize_instruction")]
    pub finalize_instruction: String,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_finalize_instruction() -> String {
    "Based on everything above, give your final answer now. Respond with a single JSON \
     value that conforms to the following JSON Schema and nothing else."
        .into()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            temperature: None,
            max_tokens: None,
            finalize_instruction: default_finalize_instruction(),
        }
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
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
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
    /// Load configuration from the default path (~/.markwright/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `MARKWRIGHT_MAX_CONCURRENT`
    /// - `MARKWRIGHT_MAX_ROUNDS`
    /// - `MARKWRIGHT_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
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
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("MARKWRIGHT_MAX_CONCURRENT") {
            self.queue.max_concurrent = parse_env("MARKWRIGHT_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = lookup("MARKWRIGHT_MAX_ROUNDS") {
            self.reasoning.max_rounds = parse_env("MARKWRIGHT_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = lookup("MARKWRIGHT_PORT") {
            self.gateway.port = parse_env("MARKWRIGHT_PORT", &value)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".markwright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "queue.max_concurrent must be at least 1".into(),
            ));
        }

        if self.queue.max_pending == Some(0) {
            return Err(ConfigError::ValidationError(
                "queue.max_pending must be at least 1 when set".into(),
            ));
        }

        if self.queue.status_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue.status_channel_capacity must be at least 1".into(),
            ));
        }

        if self.reasoning.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.max_rounds must be at least 1".into(),
            ));
        }

        if let Some(t) = self.reasoning.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "reasoning.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::EnvError {
        key: key.to_string(),
        value: value.to_string(),
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

    #[error("Invalid value {value:?} for environment variable {key}")]
    EnvError { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

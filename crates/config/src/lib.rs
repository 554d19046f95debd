//! Configuration loading, validation, and management for safeq.
//!
//! Loads configuration from `~/.safeq/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.safeq/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default text-generation provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Relational store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Retrieval loop configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2048
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("store", &self.store)
            .field("retrieval", &self.retrieval)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Open the database read-only (the real safety boundary)
    #[serde(default = "default_true")]
    pub read_only: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_store_path() -> String {
    AppConfig::config_dir()
        .join("events.db")
        .to_string_lossy()
        .into_owned()
}
fn default_max_connections() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            read_only: true,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Generation attempts before falling back to keyword search
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Rows rendered into the context block
    #[serde(default = "default_row_display_cap")]
    pub row_display_cap: usize,

    /// Rows listed per entity by the fallback search
    #[serde(default = "default_fallback_limit")]
    pub fallback_limit: usize,

    /// Exchanges handed to each retrieval
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Exchanges a chat session retains
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// History longer than this is compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    #[serde(default = "default_result_snippet_chars")]
    pub result_snippet_chars: usize,

    #[serde(default = "default_response_snippet_chars")]
    pub response_snippet_chars: usize,

    /// Refused by the safety gate on top of the built-in write/DDL list
    #[serde(default = "default_extra_forbidden_keywords")]
    pub extra_forbidden_keywords: Vec<String>,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_row_display_cap() -> usize {
    50
}
fn default_fallback_limit() -> usize {
    10
}
fn default_history_window() -> usize {
    3
}
fn default_history_capacity() -> usize {
    5
}
fn default_compression_threshold() -> usize {
    2
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_execution_timeout_secs() -> u64 {
    30
}
fn default_result_snippet_chars() -> usize {
    800
}
fn default_response_snippet_chars() -> usize {
    300
}
fn default_extra_forbidden_keywords() -> Vec<String> {
    vec!["ATTACH".into(), "DETACH".into(), "PRAGMA".into()]
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            row_display_cap: default_row_display_cap(),
            fallback_limit: default_fallback_limit(),
            history_window: default_history_window(),
            history_capacity: default_history_capacity(),
            compression_threshold: default_compression_threshold(),
            generation_timeout_secs: default_generation_timeout_secs(),
            execution_timeout_secs: default_execution_timeout_secs(),
            result_snippet_chars: default_result_snippet_chars(),
            response_snippet_chars: default_response_snippet_chars(),
            extra_forbidden_keywords: default_extra_forbidden_keywords(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.safeq/config.toml).
    ///
    /// Also checks environment variables:
    /// - `SAFEQ_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`,
    ///   consulted only when the file sets no `api_key`
    /// - `SAFEQ_PROVIDER`, `SAFEQ_MODEL`, `SAFEQ_DB_PATH`, which always win
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("SAFEQ_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("SAFEQ_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("SAFEQ_MODEL") {
            self.default_model = model;
        }

        if let Some(path) = lookup("SAFEQ_DB_PATH") {
            self.store.path = path;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".safeq")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let r = &self.retrieval;
        if r.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.max_attempts must be at least 1".into(),
            ));
        }
        if r.row_display_cap == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.row_display_cap must be at least 1".into(),
            ));
        }
        if r.history_window > r.history_capacity {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.history_window ({}) cannot exceed history_capacity ({})",
                r.history_window, r.history_capacity
            )));
        }
        if r.generation_timeout_secs == 0 || r.execution_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval timeouts must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            providers: HashMap::new(),
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

//! TOML Configuration File Support
//!
//! Client settings are read from `~/.config/ragchat/config.toml`, then
//! environment variables, then command-line overrides.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! api_url = "http://rag.internal:8000"
//! stream_path = "/api/rag/stream"
//! datasets_path = "/api/datasets"
//! health_path = "/health"
//! top_k = 5
//! include_thinking = true
//! request_timeout_secs = 30
//! connect_timeout_secs = 10
//! default_dataset = "handbook"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend base URL override
pub const ENV_API_URL: &str = "RAGCHAT_API_URL";
/// Request timeout override (seconds)
pub const ENV_TIMEOUT_SECS: &str = "RAGCHAT_TIMEOUT_SECS";
/// Default dataset override
pub const ENV_DATASET: &str = "RAGCHAT_DATASET";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structure
// =============================================================================

/// On-disk shape of the configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// Backend base URL
    pub api_url: Option<String>,
    /// Streaming query endpoint
    pub stream_path: Option<String>,
    /// Dataset listing endpoint
    pub datasets_path: Option<String>,
    /// Health endpoint
    pub health_path: Option<String>,
    /// Documents retrieved per query
    pub top_k: Option<u32>,
    /// Ask the backend for reasoning tokens
    pub include_thinking: Option<bool>,
    /// Timeout for non-streaming calls
    pub request_timeout_secs: Option<u64>,
    /// Connect timeout for every call
    pub connect_timeout_secs: Option<u64>,
    /// Dataset used when none is given
    pub default_dataset: Option<String>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash
    pub api_url: String,
    /// Streaming query endpoint
    pub stream_path: String,
    /// Dataset listing endpoint
    pub datasets_path: String,
    /// Health endpoint
    pub health_path: String,
    /// Documents retrieved per query
    pub top_k: u32,
    /// Ask the backend for reasoning tokens
    pub include_thinking: bool,
    /// Timeout for non-streaming calls
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Dataset used when none is given
    pub default_dataset: Option<String>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            stream_path: "/api/rag/stream".to_string(),
            datasets_path: "/api/datasets".to_string(),
            health_path: "/health".to_string(),
            top_k: 3,
            include_thinking: false,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            default_dataset: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Join the base URL with an endpoint path
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check values that would otherwise fail at request time
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api_url must start with http:// or https://, got {:?}",
                self.api_url
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/ragchat/config.toml` or
/// `~/.config/ragchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ragchat").join("config.toml"))
}

/// Load configuration from the default path plus environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// result fails validation. A missing default config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    let path = default_config_path().filter(|p| {
        let found = p.exists();
        if !found {
            tracing::debug!(path = %p.display(), "Config file not found, using defaults");
        }
        found
    });
    load_config_from_path(path)
}

/// Load configuration from a specific path plus environment
///
/// # Errors
///
/// Returns an error if the file cannot be read (including when it does not
/// exist) or parsed, or if the result fails validation. `None` loads defaults
/// plus environment.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        let toml_content =
            std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                path: config_path.clone(),
                source: e,
            })?;

        let toml_config: ConfigToml = toml::from_str(&toml_content)?;
        apply_toml_config(&mut config, &toml_config);
        config.config_file_path = Some(config_path.clone());
        config.source = ConfigSource::File;

        tracing::info!(
            path = %config_path.display(),
            "Loaded configuration from file"
        );
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ConfigToml) {
    if let Some(ref url) = toml.api_url {
        config.api_url = url.clone();
    }
    if let Some(ref path) = toml.stream_path {
        config.stream_path = path.clone();
    }
    if let Some(ref path) = toml.datasets_path {
        config.datasets_path = path.clone();
    }
    if let Some(ref path) = toml.health_path {
        config.health_path = path.clone();
    }
    if let Some(top_k) = toml.top_k {
        config.top_k = top_k;
    }
    if let Some(include) = toml.include_thinking {
        config.include_thinking = include;
    }
    if let Some(secs) = toml.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if toml.default_dataset.is_some() {
        config.default_dataset = toml.default_dataset.clone();
    }
}

fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env(ENV_API_URL).filter(|v| !v.is_empty()) {
        config.api_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env(ENV_TIMEOUT_SECS) {
        match timeout.parse::<u64>() {
            Ok(secs) => {
                config.request_timeout = Duration::from_secs(secs);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %timeout, "Ignoring unparseable {ENV_TIMEOUT_SECS}"),
        }
    }
    if let Some(dataset) = env(ENV_DATASET).filter(|v| !v.is_empty()) {
        config.default_dataset = Some(dataset);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend base URL override
    pub api_url: Option<String>,
    /// Dataset override
    pub dataset: Option<String>,
    /// Retrieval depth override
    pub top_k: Option<u32>,
    /// Reasoning tokens override
    pub include_thinking: Option<bool>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend URL override
    #[must_use]
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// Set dataset override
    #[must_use]
    pub fn with_dataset(mut self, dataset: String) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Set retrieval depth override
    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set reasoning tokens override
    #[must_use]
    pub fn with_include_thinking(mut self, include: bool) -> Self {
        self.include_thinking = Some(include);
        self
    }

    /// Apply overrides and re-validate
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is invalid.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if self.api_url.is_some()
            || self.dataset.is_some()
            || self.top_k.is_some()
            || self.include_thinking.is_some()
        {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref url) = self.api_url {
            config.api_url = url.clone();
        }
        if let Some(ref dataset) = self.dataset {
            config.default_dataset = Some(dataset.clone());
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(include) = self.include_thinking {
            config.include_thinking = include;
        }
        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! TOML Configuration File Support
//!
//! Configuration for the engine lives in
//! `$XDG_CONFIG_HOME/screenflow/engine.toml` (typically
//! `~/.config/screenflow/engine.toml`).
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. Environment variables (`SCREENFLOW_*`)
//! 2. TOML configuration file
//! 3. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [flows]
//! directory = "assets/flows"
//! preload = ["auth", "dashboard"]
//!
//! [flows.paths]
//! onboarding = "assets/onboarding/v2.json"
//!
//! [network]
//! base_url = "https://api.example.com"
//! timeout_ms = 15000
//!
//! [network.default_headers]
//! Accept = "application/json"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::FlowSources;

/// Environment variable: flow directory
pub const ENV_FLOW_DIR: &str = "SCREENFLOW_FLOW_DIR";
/// Environment variable: comma-separated flow ids to preload
pub const ENV_PRELOAD: &str = "SCREENFLOW_PRELOAD";
/// Environment variable: API base URL
pub const ENV_BASE_URL: &str = "SCREENFLOW_BASE_URL";
/// Environment variable: request timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "SCREENFLOW_TIMEOUT_MS";

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

/// Where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// At least one environment variable applied
    Env,
    /// Loaded from the TOML file
    File,
    /// Nothing but defaults
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[flows]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowsToml {
    /// Directory holding `<flowId>.json` files
    pub directory: Option<PathBuf>,
    /// Flow ids loaded at startup
    pub preload: Option<Vec<String>>,
    /// Explicit per-flow source paths
    pub paths: BTreeMap<String, String>,
}

/// `[network]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkToml {
    /// Base URL prepended to relative endpoints
    pub base_url: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenflowToml {
    /// Flow sources
    pub flows: FlowsToml,
    /// HTTP client
    pub network: NetworkToml,
}

// =============================================================================
// Effective Configuration
// =============================================================================

/// Where flows come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowSettings {
    /// Directory holding `<flowId>.json` files
    pub directory: PathBuf,
    /// Flow ids loaded at startup
    pub preload: Vec<String>,
    /// Explicit per-flow source paths
    pub paths: BTreeMap<String, String>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("flows"),
            preload: Vec::new(),
            paths: BTreeMap::new(),
        }
    }
}

impl FlowSettings {
    /// Path resolver for the flow cache
    #[must_use]
    pub fn sources(&self) -> FlowSources {
        self.paths
            .iter()
            .fold(FlowSources::new(&self.directory), |sources, (id, path)| {
                sources.with_path(id.clone(), path.clone())
            })
    }
}

/// HTTP client settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Base URL prepended to relative endpoints
    pub base_url: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
            default_headers: BTreeMap::new(),
        }
    }
}

impl NetworkSettings {
    /// Request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Effective engine configuration
///
/// Use [`load_config`] to build one with proper priority handling.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Flow sources
    pub flows: FlowSettings,
    /// HTTP client
    pub network: NetworkSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flows: FlowSettings::default(),
            network: NetworkSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(ref url) = self.network.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "network.base_url must start with http:// or https://, got {url}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// `$XDG_CONFIG_HOME/screenflow/engine.toml` or
/// `~/.config/screenflow/engine.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("screenflow").join("engine.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing file is not an error.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path plus the process environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the result
/// fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ScreenflowToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut EngineConfig, toml: ScreenflowToml) {
    // Flows
    if let Some(directory) = toml.flows.directory {
        config.flows.directory = directory;
    }
    if let Some(preload) = toml.flows.preload {
        config.flows.preload = preload;
    }
    config.flows.paths.extend(toml.flows.paths);

    // Network
    if toml.network.base_url.is_some() {
        config.network.base_url = toml.network.base_url;
    }
    if let Some(timeout) = toml.network.timeout_ms {
        config.network.timeout_ms = timeout;
    }
    config.network.default_headers.extend(toml.network.default_headers);
}

fn apply_env_config(config: &mut EngineConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = env(ENV_FLOW_DIR) {
        config.flows.directory = PathBuf::from(dir);
        config.source = ConfigSource::Env;
    }
    if let Some(preload) = env(ENV_PRELOAD) {
        config.flows.preload = preload
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env(ENV_BASE_URL) {
        config.network.base_url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env(ENV_TIMEOUT_MS) {
        match timeout.parse::<u64>() {
            Ok(ms) => {
                config.network.timeout_ms = ms;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(var = ENV_TIMEOUT_MS, value = %timeout, "Ignoring non-numeric value"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

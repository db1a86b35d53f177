//! TOML Configuration File Support
//!
//! Centralized configuration loading for the bridge binaries, backed by a
//! TOML file at `~/.config/surface-bridge/bridge.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Environment Variables
//!
//! | Variable                 | Setting                   |
//! |--------------------------|---------------------------|
//! | `BRIDGE_SOCKET`          | `transport.socket_path`   |
//! | `BRIDGE_CALL_TIMEOUT_MS` | `client.call_timeout_ms`  |
//! | `BRIDGE_RETURN_POLICY`   | `controller.return_policy`|
//!
//! # Example Configuration
//!
//! ```toml
//! [controller]
//! return_policy = "explicit"
//! operation_timeout_ms = 5000
//! error_event_capacity = 128
//!
//! [client]
//! call_timeout_ms = 30000   # 0 disables the deadline
//!
//! [transport]
//! socket_path = "/run/user/1000/surface-bridge/bridge.sock"
//! max_connections = 64
//! channel_capacity = 256
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientConfig;
use crate::controller::{ControllerConfig, ReturnPolicy};
use crate::transport::config::TransportConfig;

/// Socket path override
pub const ENV_SOCKET: &str = "BRIDGE_SOCKET";
/// Client call deadline override, in milliseconds
pub const ENV_CALL_TIMEOUT_MS: &str = "BRIDGE_CALL_TIMEOUT_MS";
/// Return policy override
pub const ENV_RETURN_POLICY: &str = "BRIDGE_RETURN_POLICY";

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
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Value from TOML configuration file
    File,
    /// Value from environment variable
    Env,
    /// Value from command-line argument
    Cli,
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
// TOML Configuration Structures
// =============================================================================

/// Controller section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerToml {
    /// `truthiness` or `explicit`
    pub return_policy: Option<ReturnPolicy>,
    /// Per-operation deadline in milliseconds (0 = none)
    pub operation_timeout_ms: Option<u64>,
    /// Buffered error events per subscriber
    pub error_event_capacity: Option<usize>,
}

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Per-call deadline in milliseconds (0 = none)
    pub call_timeout_ms: Option<u64>,
}

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Unix socket path for IPC
    pub socket_path: Option<PathBuf>,
    /// Maximum simultaneous display connections
    pub max_connections: Option<usize>,
    /// Capacity of per-connection queues
    pub channel_capacity: Option<usize>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeToml {
    /// `[controller]`
    pub controller: ControllerToml,
    /// `[client]`
    pub client: ClientToml,
    /// `[transport]`
    pub transport: TransportToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved bridge configuration
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Controller settings
    pub controller: ControllerConfig,
    /// Client settings
    pub client: ClientConfig,
    /// Transport settings
    pub transport: TransportConfig,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Where each non-default setting came from, keyed `section.field`
    sources: BTreeMap<&'static str, ConfigSource>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            client: ClientConfig::default(),
            transport: TransportConfig::default(),
            config_file_path: None,
            sources: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where a setting came from, by `section.field` name
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources.get(key).copied().unwrap_or(ConfigSource::Default)
    }

    /// Highest-priority source that contributed any value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.sources
            .values()
            .copied()
            .max()
            .unwrap_or(ConfigSource::Default)
    }

    /// Check the resolved values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.socket_path must not be empty".to_string(),
            ));
        }
        if self.transport.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "transport.max_connections must be at least 1".to_string(),
            ));
        }
        if self.transport.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "transport.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.controller.error_event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "controller.error_event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn set_source(&mut self, key: &'static str, source: ConfigSource) {
        self.sources.insert(key, source);
    }
}

/// Millisecond setting where 0 disables the deadline
fn deadline(ms: u64) -> Option<Duration> {
    (ms > 0).then_some(Duration::from_millis(ms))
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/surface-bridge/bridge.toml` or
/// `~/.config/surface-bridge/bridge.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("surface-bridge").join("bridge.toml"))
}

/// Load configuration from the default file and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or a
/// value is invalid. A missing config file is not an error.
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or a value is invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<BridgeConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed, or an
/// environment variable holds an unusable value.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<BridgeConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BridgeConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: BridgeToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut BridgeConfig, toml: &BridgeToml) {
    if let Some(policy) = toml.controller.return_policy {
        config.controller.return_policy = policy;
        config.set_source("controller.return_policy", ConfigSource::File);
    }
    if let Some(ms) = toml.controller.operation_timeout_ms {
        config.controller.operation_timeout = deadline(ms);
        config.set_source("controller.operation_timeout_ms", ConfigSource::File);
    }
    if let Some(capacity) = toml.controller.error_event_capacity {
        config.controller.error_event_capacity = capacity;
        config.client.error_event_capacity = capacity;
        config.set_source("controller.error_event_capacity", ConfigSource::File);
    }

    if let Some(ms) = toml.client.call_timeout_ms {
        config.client.call_timeout = deadline(ms);
        config.set_source("client.call_timeout_ms", ConfigSource::File);
    }

    if let Some(ref path) = toml.transport.socket_path {
        config.transport.socket_path.clone_from(path);
        config.set_source("transport.socket_path", ConfigSource::File);
    }
    if let Some(max) = toml.transport.max_connections {
        config.transport.max_connections = max;
        config.set_source("transport.max_connections", ConfigSource::File);
    }
    if let Some(capacity) = toml.transport.channel_capacity {
        config.transport.channel_capacity = capacity;
        config.set_source("transport.channel_capacity", ConfigSource::File);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut BridgeConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env(ENV_SOCKET).filter(|p| !p.is_empty()) {
        config.transport.socket_path = PathBuf::from(path);
        config.set_source("transport.socket_path", ConfigSource::Env);
    }

    if let Some(raw) = env(ENV_CALL_TIMEOUT_MS) {
        let ms = raw.trim().parse::<u64>().map_err(|e| {
            ConfigError::ValidationError(format!("{ENV_CALL_TIMEOUT_MS}='{raw}': {e}"))
        })?;
        config.client.call_timeout = deadline(ms);
        config.set_source("client.call_timeout_ms", ConfigSource::Env);
    }

    if let Some(raw) = env(ENV_RETURN_POLICY) {
        config.controller.return_policy = raw
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("{ENV_RETURN_POLICY}: {e}")))?;
        config.set_source("controller.return_policy", ConfigSource::Env);
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,

    /// Return policy override
    pub return_policy: Option<ReturnPolicy>,

    /// Operation deadline override (milliseconds, 0 = none)
    pub operation_timeout_ms: Option<u64>,

    /// Call deadline override (milliseconds, 0 = none)
    pub call_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set return policy override
    #[must_use]
    pub fn with_return_policy(mut self, policy: ReturnPolicy) -> Self {
        self.return_policy = Some(policy);
        self
    }

    /// Set operation deadline override
    #[must_use]
    pub fn with_operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout_ms = Some(ms);
        self
    }

    /// Set call deadline override
    #[must_use]
    pub fn with_call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(ref path) = self.socket_path {
            config.transport.socket_path.clone_from(path);
            config.set_source("transport.socket_path", ConfigSource::Cli);
        }
        if let Some(policy) = self.return_policy {
            config.controller.return_policy = policy;
            config.set_source("controller.return_policy", ConfigSource::Cli);
        }
        if let Some(ms) = self.operation_timeout_ms {
            config.controller.operation_timeout = deadline(ms);
            config.set_source("controller.operation_timeout_ms", ConfigSource::Cli);
        }
        if let Some(ms) = self.call_timeout_ms {
            config.client.call_timeout = deadline(ms);
            config.set_source("client.call_timeout_ms", ConfigSource::Cli);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Configuration management for the dirshare daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/dirshare/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::pipe::DEFAULT_CAPACITY;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_size must be greater than 0, got {0}")]
    InvalidMaxSize(u64),

    #[error("archive_buffer_chunks must be between 1 and 1024, got {0}")]
    InvalidArchiveBuffer(usize),

    #[error("shutdown_timeout must be between 0 and 300 seconds, got {0}")]
    InvalidShutdownTimeout(u64),

    #[error("bind must be a socket address like 0.0.0.0:22010, got {0}")]
    InvalidBindAddress(String),

    #[error("username and password must be set together")]
    IncompleteCredentials,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:22010";

/// Main configuration structure for the dirshare daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub http: HttpConfig,

    /// Shared directory configuration.
    pub file: FileConfig,

    /// Security settings.
    pub security: SecurityConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to listen on.
    pub bind: String,

    /// Serve HTTPS with a self-signed certificate generated at startup.
    pub tls: bool,

    /// Seconds to let open connections drain on shutdown.
    pub shutdown_timeout: u64,
}

/// Shared directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Directory exposed by the server.
    pub root: PathBuf,

    /// Maximum upload request size in bytes (default: 1GB).
    pub max_size: u64,

    /// Chunks buffered between an archive walk and its download.
    pub archive_buffer_chunks: usize,
}

/// Security settings.
///
/// HTTP Basic authentication is enabled when both fields are non-empty.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Basic auth user name.
    pub username: String,

    /// Basic auth password.
    pub password: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            tls: false,
            shutdown_timeout: 10,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_size: 1024 * 1024 * 1024, // 1GB
            archive_buffer_chunks: DEFAULT_CAPACITY,
        }
    }
}

impl HttpConfig {
    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind.clone()))
    }

    /// Connection drain period on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl SecurityConfig {
    /// Whether Basic authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dirshare")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DIRSHARE_ROOT: Override the shared directory
    /// - DIRSHARE_BIND: Override the listen address
    /// - DIRSHARE_TLS: Enable (`true`, `1`) or disable TLS
    /// - DIRSHARE_USERNAME / DIRSHARE_PASSWORD: Basic auth credentials
    /// - DIRSHARE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns each overridden key with the value to report for it (secrets
    /// masked), so the caller can log them once logging is up.
    pub fn apply_env_overrides(&mut self) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();

        if let Some(root) = env_override("DIRSHARE_ROOT") {
            self.file.root = PathBuf::from(&root);
            applied.push(("root", root));
        }

        if let Some(bind) = env_override("DIRSHARE_BIND") {
            self.http.bind = bind.clone();
            applied.push(("bind", bind));
        }

        if let Some(tls) = env_override("DIRSHARE_TLS") {
            self.http.tls = matches!(tls.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
            applied.push(("tls", self.http.tls.to_string()));
        }

        if let Some(username) = env_override("DIRSHARE_USERNAME") {
            self.security.username = username.clone();
            applied.push(("username", username));
        }

        if let Some(password) = env_override("DIRSHARE_PASSWORD") {
            self.security.password = password;
            applied.push(("password", "********".to_string()));
        }

        if let Some(level) = env_override("DIRSHARE_LOG_LEVEL") {
            self.daemon.log_level = level.clone();
            applied.push(("log_level", level));
        }

        applied
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file.max_size == 0 {
            return Err(ConfigError::InvalidMaxSize(self.file.max_size));
        }

        let chunks = self.file.archive_buffer_chunks;
        if !(1..=1024).contains(&chunks) {
            return Err(ConfigError::InvalidArchiveBuffer(chunks));
        }

        if self.http.shutdown_timeout > 300 {
            return Err(ConfigError::InvalidShutdownTimeout(self.http.shutdown_timeout));
        }

        self.http.bind_addr()?;

        if self.security.username.is_empty() != self.security.password.is_empty() {
            return Err(ConfigError::IncompleteCredentials);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

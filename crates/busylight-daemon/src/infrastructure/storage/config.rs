//! TOML configuration for the daemon.
//!
//! Read from the platform-appropriate config file unless `--config` names
//! another one:
//! - Windows:  `%APPDATA%\Busylight\config.toml`
//! - Linux:    `~/.config/busylight/config.toml`
//! - macOS:    `~/Library/Application Support/Busylight/config.toml`
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration:
//!
//! ```toml
//! log_level = "info"
//!
//! [control]
//! bind_address = "0.0.0.0"
//! port = 8765
//!
//! [devices]
//! aliases = ["desk:ABC123"]
//!
//! [timing]
//! keepalive_secs = 5
//! removal_grace_ms = 1000
//! hotplug_poll_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use busylight_core::{AliasError, DeviceAlias};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::directory::DirectoryTiming;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// An alias entry is not of the form `name:serial`.
    #[error(transparent)]
    InvalidAlias(#[from] AliasError),

    /// The log level is not one of error, warn, info, debug, trace.
    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    /// A timing value that would make a timer spin.
    #[error("[timing] {field} must be at least 1")]
    ZeroTiming { field: &'static str },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Where the WebSocket control surface listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevicesConfig {
    /// `name:serial` mappings giving devices operator-chosen ids.
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// How long a vanished device keeps its session.
    #[serde(default = "default_removal_grace_ms")]
    pub removal_grace_ms: u64,
    /// How often the hot-plug watcher re-enumerates.
    #[serde(default = "default_hotplug_poll_ms")]
    pub hotplug_poll_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_keepalive_secs() -> u64 {
    5
}
fn default_removal_grace_ms() -> u64 {
    1000
}
fn default_hotplug_poll_ms() -> u64 {
    2000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            control: ControlConfig::default(),
            devices: DevicesConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            removal_grace_ms: default_removal_grace_ms(),
            hotplug_poll_ms: default_hotplug_poll_ms(),
        }
    }
}

impl DaemonConfig {
    /// Parses every alias entry.  The first malformed one is an error.
    pub fn parse_aliases(&self) -> Result<Vec<DeviceAlias>, ConfigError> {
        self.devices
            .aliases
            .iter()
            .map(|entry| entry.parse::<DeviceAlias>().map_err(ConfigError::from))
            .collect()
    }

    /// The configured log level as a `tracing` filter directive.
    pub fn log_filter(&self) -> Result<&'static str, ConfigError> {
        normalize_log_level(&self.log_level)
    }
}

impl TimingConfig {
    /// Rejects zero periods.  A zero removal grace is allowed and removes
    /// vanished devices on the next event-loop turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive_secs == 0 {
            return Err(ConfigError::ZeroTiming {
                field: "keepalive_secs",
            });
        }
        if self.hotplug_poll_ms == 0 {
            return Err(ConfigError::ZeroTiming {
                field: "hotplug_poll_ms",
            });
        }
        Ok(())
    }

    pub fn directory_timing(&self) -> DirectoryTiming {
        DirectoryTiming {
            keepalive: Duration::from_secs(self.keepalive_secs),
            removal_grace: Duration::from_millis(self.removal_grace_ms),
        }
    }

    pub fn hotplug_poll(&self) -> Duration {
        Duration::from_millis(self.hotplug_poll_ms)
    }
}

/// Maps a user-facing level name to a `tracing` directive.  Case-insensitive;
/// `warning` is accepted for `warn`.
pub fn normalize_log_level(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => Ok("error"),
        "warn" | "warning" => Ok("warn"),
        "info" => Ok("info"),
        "debug" => Ok("debug"),
        "trace" => Ok("trace"),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the default config file, returning `DaemonConfig::default()` if it
/// does not exist yet.
pub fn load_config() -> Result<DaemonConfig, ConfigError> {
    let path = config_file_path()?;
    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DaemonConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Loads an explicitly named config file.  Unlike [`load_config`], a missing
/// file is an error.
pub fn load_config_from(path: &Path) -> Result<DaemonConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<DaemonConfig, ConfigError> {
    let config: DaemonConfig = toml::from_str(content)?;
    config.timing.validate()?;
    Ok(config)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Busylight"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("busylight"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Busylight")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! TOML configuration schema types for ws-keeper.
//!
//! All structs derive `Deserialize` and `Serialize` with sensible defaults via
//! `#[serde(default)]`, so an empty file is a valid configuration.
//!
//! Duration fields use human-readable strings (e.g. `"5s"`, `"250ms"`)
//! parsed by the `humantime` crate at the call site.
//!
//! Connection targets and credentials are deliberately absent: they only ever
//! arrive as command parameters.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::target::QueryEncoding;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration encompassing all sections.
///
/// ```toml
/// [daemon]
/// [reconnect]
/// [target]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Daemon process settings.
    pub daemon: TomlDaemonConfig,
    /// Automatic reconnect settings.
    pub reconnect: ReconnectConfig,
    /// Target URL construction settings.
    pub target: TargetConfig,
}

impl Config {
    /// Parsed `reconnect.delay`.
    pub fn reconnect_delay(&self) -> Result<Duration, ConfigError> {
        let field = "reconnect.delay";
        let delay = humantime::parse_duration(&self.reconnect.delay).map_err(|e| {
            ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("{:?}: {}", self.reconnect.delay, e),
            }
        })?;
        if delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(delay)
    }

    pub fn query_encoding(&self) -> QueryEncoding {
        if self.target.percent_encode_query {
            QueryEncoding::Percent
        } else {
            QueryEncoding::Verbatim
        }
    }

    /// Socket path override, if one is configured.
    pub fn socket_path(&self) -> Option<PathBuf> {
        let raw = self.daemon.socket_path.trim();
        (!raw.is_empty()).then(|| super::xdg::expand_tilde(raw))
    }

    /// Checks every value that is only interpreted after parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconnect_delay().map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon process configuration from the TOML `[daemon]` section.
///
/// Named `TomlDaemonConfig` to avoid collision with the runtime
/// `crate::DaemonConfig`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TomlDaemonConfig {
    /// Unix socket path. Empty means the XDG default.
    pub socket_path: String,
    /// Logging verbosity, used when `WSK_LOG` is unset.
    pub log_level: LogLevel,
}

impl Default for TomlDaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: String::new(),
            log_level: LogLevel::Info,
        }
    }
}

/// Log verbosity levels (kebab-case in TOML).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Error,
    Warn,
    /// Default.
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between a failure and the next attempt (default `"5s"`).
    pub delay: String,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: "5s".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    /// Percent-encode query keys and values. Off by default, which copies
    /// them verbatim into the URL.
    pub percent_encode_query: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

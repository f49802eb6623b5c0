//! ws-keeper library
//!
//! A background connection manager that keeps one WebSocket connection alive
//! on behalf of local callers. Callers drive it through [`control`] (or the
//! daemon's Unix socket), and receive connection status and inbound frames
//! through a single listener on the [`bridge`].
//!
//! # Platform Support
//!
//! This crate currently supports **Unix-like systems only** (Linux, macOS).
//!
//! Unix-specific features used:
//! - Unix domain sockets for IPC
//! - `fork()` for daemon process creation
//! - Unix signal handling (SIGTERM, SIGINT)

use std::path::PathBuf;
use std::time::Duration;

/// Single-listener event delivery.
pub mod bridge;

/// TOML configuration loading and XDG paths.
pub mod config;

/// Validated entry points shared by the daemon and embedders.
pub mod control;

/// Daemon module providing process lifecycle management and daemonization.
pub mod daemon;

/// JSON Lines wire types.
pub mod ipc;

/// Connection state machine.
pub mod manager;

/// Fixed-delay reconnect scheduling.
pub mod reconnect;

/// Connection target construction.
pub mod target;

/// WebSocket transport.
pub mod transport;

/// Client for daemon communication with auto-start capability.
pub mod client;

use config::schema::LogLevel;
use config::{Config, ConfigError};
use target::QueryEncoding;

/// Configuration for the daemon process.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to the Unix socket for IPC communication.
    pub socket_path: PathBuf,
    /// Whether to run as a background daemon (detached from terminal).
    pub daemonize: bool,
    /// Delay between a connection failure and the next attempt.
    pub reconnect_delay: Duration,
    pub query_encoding: QueryEncoding,
    /// Level used when `WSK_LOG` is unset.
    pub log_level: LogLevel,
}

impl DaemonConfig {
    /// Creates a new DaemonConfig with the specified socket path and daemonize
    /// flag. Everything else takes its default.
    pub fn new(socket_path: PathBuf, daemonize: bool) -> Self {
        Self {
            socket_path,
            daemonize,
            reconnect_delay: reconnect::DEFAULT_RECONNECT_DELAY,
            query_encoding: QueryEncoding::default(),
            log_level: LogLevel::Info,
        }
    }

    /// Builds the runtime configuration from a loaded config file.
    ///
    /// `socket_override` wins over `daemon.socket_path`, which wins over the
    /// XDG default.
    pub fn from_config(
        config: &Config,
        socket_override: Option<PathBuf>,
        daemonize: bool,
    ) -> Result<Self, ConfigError> {
        let socket_path = Self::resolve_socket_path(config, socket_override)?;
        Ok(Self {
            socket_path,
            daemonize,
            reconnect_delay: config.reconnect_delay()?,
            query_encoding: config.query_encoding(),
            log_level: config.daemon.log_level,
        })
    }

    /// Absolute socket path: `socket_override`, then `daemon.socket_path`,
    /// then the XDG default. Relative paths are anchored at the current
    /// directory, since a detached daemon runs from `/`.
    pub fn resolve_socket_path(
        config: &Config,
        socket_override: Option<PathBuf>,
    ) -> Result<PathBuf, ConfigError> {
        let socket_path = socket_override
            .or_else(|| config.socket_path())
            .unwrap_or_else(config::xdg::socket_path);
        config::xdg::absolute(socket_path.clone()).map_err(|e| ConfigError::InvalidValue {
            field: "daemon.socket_path".to_string(),
            message: format!("cannot resolve {}: {}", socket_path.display(), e),
        })
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(config::xdg::socket_path(), false)
    }
}

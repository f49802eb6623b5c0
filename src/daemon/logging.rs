//! Logging initialization for the ws-keeper daemon.
//!
//! Configures the `tracing` subscriber with level filtering via the `WSK_LOG`
//! environment variable. When the variable is unset or invalid, the level
//! from the config file applies.
//!
//! # Usage
//!
//! ```bash
//! # Default (config file level, info unless changed)
//! wsk daemon
//!
//! # Debug level
//! WSK_LOG=debug wsk daemon
//!
//! # Module-specific filtering
//! WSK_LOG=ws_keeper::manager=debug,warn wsk daemon
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "WSK_LOG";

/// Builds the filter from `WSK_LOG`, falling back to `default_level`.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber.
///
/// Output is written to stderr, which works for foreground mode and is
/// redirected to /dev/null once daemonized.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(default_level: &str) {
    let _ = fmt()
        .with_env_filter(filter(default_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

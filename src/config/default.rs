//! Default configuration template and file creation.
//!
//! Provides a commented TOML template that matches `Config::default()` and
//! writes it to the XDG config path for `wsk config init`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::xdg;

/// A commented TOML template with all default values.
///
/// Every value here must match `Config::default()` from `schema.rs`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# ws-keeper configuration
#
# All values shown below are the built-in defaults.
# Connection targets and credentials never live here; they are passed
# with each connect command.
#
# Location: $XDG_CONFIG_HOME/ws-keeper/config.toml

# ==============================================================================
# Daemon
# ==============================================================================

[daemon]

# Unix socket the daemon listens on.
# Empty means $XDG_RUNTIME_DIR/ws-keeper.sock, or /tmp/ws-keeper.sock.
# Tilde (~) is expanded to the user's home directory.
socket_path = ""

# Logging verbosity when WSK_LOG is not set.
# Options: "error", "warn", "info", "debug", "trace"
log_level = "info"

# ==============================================================================
# Reconnect
# ==============================================================================

[reconnect]

# Fixed delay between a lost connection and the next attempt.
# Retries are unlimited; a disconnect or a new connect cancels them.
# Examples: "5s", "500ms", "1m"
delay = "5s"

# ==============================================================================
# Target
# ==============================================================================

[target]

# Percent-encode query parameter keys and values when building URLs.
# Off copies them into the URL exactly as given.
percent_encode_query = false
"#;

/// Creates (or force-overwrites) the default config file.
///
/// - If the file exists and `force` is `false`, returns `ConfigError::AlreadyExists`.
/// - If the file exists and `force` is `true`, backs it up to `.toml.backup` first.
/// - Returns the path where the config was written.
pub fn create_default_config(force: bool) -> Result<PathBuf, ConfigError> {
    let path = xdg::config_path();

    if path.exists() {
        if !force {
            return Err(ConfigError::AlreadyExists { path });
        }
        let backup_path = path.with_extension("toml.backup");
        fs::rename(&path, &backup_path).map_err(|e| ConfigError::WriteError {
            path: backup_path.clone(),
            source: e,
        })?;
        tracing::info!(backup = %backup_path.display(), "backed up existing config");
    }

    write_default_config(&path)?;
    Ok(path)
}

/// Writes the default template to `path`, creating parent dirs and setting 0600 permissions.
fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_error = |e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    };

    xdg::ensure_config_dir().map_err(write_error)?;
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_error)?;
    }

    Ok(())
}

//! Where ws-keeper keeps its files.
//!
//! `$XDG_CONFIG_HOME` and `$XDG_RUNTIME_DIR` win on every platform. Without
//! them the config lives under `~/.config` (Linux) or the macOS
//! Application Support directory, and the socket goes to `/tmp` (or
//! `$TMPDIR` on macOS).

use std::fs;
use std::io;
use std::path::PathBuf;

const APP_NAME: &str = "ws-keeper";

fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP_NAME);
    }
    #[cfg(target_os = "macos")]
    let base = dirs::config_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::home_dir().map(|home| home.join(".config"));
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME)
}

/// Default config file: `<config dir>/ws-keeper/config.toml`.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default daemon socket: `<runtime dir>/ws-keeper.sock`.
pub fn socket_path() -> PathBuf {
    let runtime = match std::env::var("XDG_RUNTIME_DIR") {
        Ok(xdg) => PathBuf::from(xdg),
        #[cfg(target_os = "macos")]
        Err(_) => std::env::var("TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp")),
        #[cfg(not(target_os = "macos"))]
        Err(_) => PathBuf::from("/tmp"),
    };
    runtime.join(format!("{APP_NAME}.sock"))
}

/// Expands a leading `~` or `~/`. Anything else is returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        (None, Some(home)) if path == "~" => home,
        _ => PathBuf::from(path),
    }
}

/// Anchors a relative path at the current directory.
///
/// Paths handed to a detaching daemon must be absolute: it changes
/// directory to `/` before binding.
pub fn absolute(path: PathBuf) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Creates the config directory (mode 0700) and returns it.
pub fn ensure_config_dir() -> io::Result<PathBuf> {
    let dir = config_dir();
    fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

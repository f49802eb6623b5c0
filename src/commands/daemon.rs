//! Daemon lifecycle command implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ws_keeper::config::{Config, ConfigError, ConfigLoader};
use ws_keeper::{daemon::run_daemon, DaemonConfig};

/// Absolute socket path from the flag, the config file, or the XDG default,
/// in that order. The config file is only read when no flag is given.
pub(crate) fn resolve_socket(
    socket: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let config = match socket {
        Some(_) => Config::default(),
        None => ConfigLoader::load(config_path)?,
    };
    DaemonConfig::resolve_socket_path(&config, socket)
}

/// Loads the config file and runs the daemon until SIGINT/SIGTERM.
pub(crate) fn run_daemon_command(
    socket: Option<PathBuf>,
    config_path: Option<&Path>,
    daemonize: bool,
) -> ExitCode {
    // Config errors are reported before daemonizing, while stderr is still
    // the terminal.
    let config = match ConfigLoader::load(config_path)
        .and_then(|file| DaemonConfig::from_config(&file, socket, daemonize))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run_daemon(config) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_socket_is_made_absolute() {
        let socket = resolve_socket(Some(PathBuf::from("rel.sock")), None).unwrap();
        assert!(socket.is_absolute());
        assert_eq!(socket, std::env::current_dir().unwrap().join("rel.sock"));
    }

    #[test]
    fn absolute_flag_socket_is_kept() {
        let socket = resolve_socket(Some(PathBuf::from("/run/wsk.sock")), None).unwrap();
        assert_eq!(socket, PathBuf::from("/run/wsk.sock"));
    }
}

//! Errors raised while reading, validating or writing `config.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `line` and `column` are one-based, or 0 when toml gives no span.
    #[error("Invalid configuration at {path}:{line}:{column}: {message}")]
    ParseError {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A setting parsed but cannot be used, e.g. `reconnect.delay = "0s"`.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// Only raised for a file named with `--config`; a missing default file
    /// means defaults.
    #[error("{message}\nPath: {path}")]
    NotFound { path: PathBuf, message: String },

    #[error("Configuration file already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("Failed to write configuration file: {path}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn parse_error_points_at_location() {
        let err = ConfigError::ParseError {
            path: PathBuf::from("wsk.toml"),
            line: 3,
            column: 9,
            message: "expected `=`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration at wsk.toml:3:9: expected `=`"
        );
    }

    #[test]
    fn invalid_value_names_the_setting() {
        let err = ConfigError::InvalidValue {
            field: "daemon.socket_path".to_string(),
            message: "cannot resolve rel.sock".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for daemon.socket_path: cannot resolve rel.sock"
        );
    }

    #[test]
    fn io_failures_keep_their_source() {
        let read = ConfigError::ReadError {
            path: PathBuf::from("/etc/ws-keeper/config.toml"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(read.to_string().contains("/etc/ws-keeper/config.toml"));
        assert!(read.source().is_some());

        let write = ConfigError::WriteError {
            path: PathBuf::from("/ro/config.toml"),
            source: io::Error::new(io::ErrorKind::Other, "read-only"),
        };
        assert!(write.source().is_some());
        assert!(ConfigError::AlreadyExists {
            path: PathBuf::from("x")
        }
        .source()
        .is_none());
    }
}

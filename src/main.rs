//! ws-keeper - CLI entry point
//!
//! This binary runs the background connection daemon and the client
//! subcommands that drive it over its Unix socket.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Keeps one WebSocket connection alive in the background
#[derive(Parser)]
#[command(name = "wsk")]
#[command(version, about = "Background WebSocket connection manager")]
struct Cli {
    /// Socket path for IPC communication (default: config file, then XDG runtime dir)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Configuration file (default: $XDG_CONFIG_HOME/ws-keeper/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the wsk CLI
#[derive(Subcommand)]
enum Commands {
    /// Start the daemon process
    Daemon {
        /// Run as a background daemon (detached from terminal)
        #[arg(long)]
        daemonize: bool,
    },

    /// Open a connection, replacing the current one
    Connect {
        #[command(subcommand)]
        target: ConnectTarget,
    },

    /// Close the connection and cancel pending reconnects
    Disconnect,

    /// Send a text frame on the open connection
    Send {
        /// Text to send
        message: String,
    },

    /// Show daemon and connection status
    Status {
        /// Print the raw JSON payload
        #[arg(long)]
        json: bool,
    },

    /// Stream connection events until interrupted
    Watch {
        /// Print each event as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Ways of describing the connection target.
#[derive(Subcommand)]
enum ConnectTarget {
    /// Connect to a full ws:// or wss:// URL
    Url {
        /// WebSocket URL
        url: String,
    },
    /// Build the URL from host, port and path
    Structured(StructuredArgs),
    /// Connect with legacy identity parameters
    Legacy(LegacyArgs),
}

#[derive(Args)]
struct StructuredArgs {
    #[arg(long)]
    host: String,
    #[arg(long)]
    port: u16,
    #[arg(long, default_value = "/ws")]
    path: String,
    /// Use ws:// instead of wss://
    #[arg(long)]
    insecure: bool,
    /// Query parameter, repeatable
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    query: Vec<(String, String)>,
    /// Handshake header, repeatable
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    headers: Vec<(String, String)>,
}

#[derive(Args)]
struct LegacyArgs {
    #[arg(long)]
    host: String,
    #[arg(long)]
    port: u16,
    #[arg(long)]
    api_key: String,
    #[arg(long)]
    employee_id: String,
    #[arg(long)]
    employee_name: String,
    #[arg(long)]
    department_id: String,
    #[arg(long)]
    account_id: String,
    /// Extra query parameter appended after the fixed ones, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    extra: Vec<(String, String)>,
}

/// Actions for the `config` subcommand.
#[derive(Subcommand)]
enum ConfigAction {
    /// Create default configuration file
    Init {
        /// Overwrite existing configuration (creates backup)
        #[arg(long)]
        force: bool,
    },
    /// Show configuration file path
    Path,
    /// Validate configuration file
    Validate,
}

/// Parses `KEY=VALUE`. The value may itself contain `=`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

fn main() -> ExitCode {
    // Parse CLI arguments BEFORE any fork/runtime operations
    // This ensures errors are shown to the user in the terminal
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Daemon { daemonize } => {
            commands::run_daemon_command(cli.socket, config, daemonize)
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::run_config_init(force),
            ConfigAction::Path => commands::run_config_path(),
            ConfigAction::Validate => commands::run_config_validate(config),
        },
        Commands::Connect { target } => with_socket(cli.socket, config, |socket| {
            commands::run_connect_command(socket, config, connect_command(target))
        }),
        Commands::Disconnect => with_socket(cli.socket, config, commands::run_disconnect_command),
        Commands::Send { message } => with_socket(cli.socket, config, |socket| {
            commands::run_send_command(socket, &message)
        }),
        Commands::Status { json } => with_socket(cli.socket, config, |socket| {
            commands::run_status_command(socket, json)
        }),
        Commands::Watch { json } => with_socket(cli.socket, config, |socket| {
            commands::run_watch_command(socket, config, json)
        }),
    }
}

/// Resolves the daemon socket and runs `f` with it.
fn with_socket(
    socket: Option<PathBuf>,
    config: Option<&Path>,
    f: impl FnOnce(&Path) -> ExitCode,
) -> ExitCode {
    match commands::resolve_socket(socket, config) {
        Ok(socket) => f(&socket),
        Err(e) => {
            eprintln!("Config error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Translates `wsk connect ...` arguments into the daemon command.
fn connect_command(target: ConnectTarget) -> ws_keeper::ipc::IpcCommand {
    use serde_json::{Map, Value};
    use ws_keeper::ipc::{IpcCommand, IpcCommandKind};

    fn pairs(pairs: Vec<(String, String)>) -> Value {
        Value::Array(
            pairs
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k), Value::String(v)]))
                .collect(),
        )
    }

    match target {
        ConnectTarget::Url { url } => {
            IpcCommand::new(IpcCommandKind::ConnectDirect).param("url", url)
        }
        ConnectTarget::Structured(args) => {
            let headers: Map<String, Value> = args
                .headers
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            IpcCommand::new(IpcCommandKind::ConnectStructured)
                .param("host", args.host)
                .param("port", args.port)
                .param("path", args.path)
                .param("useSecure", !args.insecure)
                .param("queryParams", pairs(args.query))
                .param("headers", Value::Object(headers))
        }
        ConnectTarget::Legacy(args) => IpcCommand::new(IpcCommandKind::ConnectLegacy)
            .param("host", args.host)
            .param("port", args.port)
            .param("apiKey", args.api_key)
            .param("employeeId", args.employee_id)
            .param("employeeName", args.employee_name)
            .param("departmentId", args.department_id)
            .param("accountId", args.account_id)
            .param("extraParams", pairs(args.extra)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_daemonize_flag_default_false() {
        let cli = Cli::try_parse_from(["wsk", "daemon"]).unwrap();
        match cli.command {
            Commands::Daemon { daemonize } => assert!(!daemonize),
            _ => panic!("expected Daemon command"),
        }
    }

    #[test]
    fn test_global_socket_after_subcommand() {
        let cli = Cli::try_parse_from(["wsk", "daemon", "--daemonize", "--socket", "/custom/path.sock"])
            .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/custom/path.sock")));
        assert!(matches!(cli.command, Commands::Daemon { daemonize: true }));
    }

    #[test]
    fn test_connect_requires_target() {
        assert!(Cli::try_parse_from(["wsk", "connect"]).is_err());
    }

    #[test]
    fn test_connect_url_command() {
        let cli = Cli::try_parse_from(["wsk", "connect", "url", "wss://example.com/ws"]).unwrap();
        let Commands::Connect { target } = cli.command else {
            panic!("expected Connect command");
        };
        let cmd = connect_command(target);
        assert_eq!(cmd.cmd, "connectDirect");
        assert_eq!(cmd.params["url"], json!("wss://example.com/ws"));
    }

    #[test]
    fn test_connect_structured_command() {
        let cli = Cli::try_parse_from([
            "wsk", "connect", "structured", "--host", "h", "--port", "9000", "--insecure",
            "--query", "a=1", "--query", "b=x=y", "--header", "Authorization=Bearer t",
        ])
        .unwrap();
        let Commands::Connect { target } = cli.command else {
            panic!("expected Connect command");
        };
        let cmd = connect_command(target);
        assert_eq!(cmd.cmd, "connectStructured");
        assert_eq!(cmd.params["port"], json!(9000));
        assert_eq!(cmd.params["path"], json!("/ws"));
        assert_eq!(cmd.params["useSecure"], json!(false));
        assert_eq!(cmd.params["queryParams"], json!([["a", "1"], ["b", "x=y"]]));
        assert_eq!(cmd.params["headers"], json!({"Authorization": "Bearer t"}));
    }

    #[test]
    fn test_connect_legacy_requires_identity() {
        let result = Cli::try_parse_from(["wsk", "connect", "legacy", "--host", "h", "--port", "1"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "wsk", "connect", "legacy", "--host", "h", "--port", "8443", "--api-key", "k",
            "--employee-id", "7", "--employee-name", "Ann", "--department-id", "d",
            "--account-id", "a", "--param", "x=1",
        ])
        .unwrap();
        let Commands::Connect { target } = cli.command else {
            panic!("expected Connect command");
        };
        let cmd = connect_command(target);
        assert_eq!(cmd.cmd, "connectLegacy");
        assert_eq!(cmd.params["employeeName"], json!("Ann"));
        assert_eq!(cmd.params["extraParams"], json!([["x", "1"]]));
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(parse_key_val("a=b"), Ok(("a".into(), "b".into())));
        assert_eq!(parse_key_val("a="), Ok(("a".into(), "".into())));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=v").is_err());
    }

    #[test]
    fn test_config_without_action_fails() {
        assert!(Cli::try_parse_from(["wsk", "config"]).is_err());
    }

    #[test]
    fn test_send_requires_message() {
        assert!(Cli::try_parse_from(["wsk", "send"]).is_err());
        let cli = Cli::try_parse_from(["wsk", "send", "hello"]).unwrap();
        assert!(matches!(cli.command, Commands::Send { message } if message == "hello"));
    }
}

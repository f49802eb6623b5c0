//! IPC command implementations.
//!
//! Handles client commands that talk to the daemon over its socket:
//! - `connect` - Start a connection (lazy-starts the daemon)
//! - `disconnect` / `send` - Drive the current connection
//! - `status` - Show daemon and connection state
//! - `watch` - Stream connection events

use std::future::Future;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use ws_keeper::client::{self, Client, ClientResult};
use ws_keeper::ipc::{DaemonStatus, IpcCommand, IpcCommandKind, IpcNotification, IpcResponse};

/// Runs `f` on a fresh Tokio runtime.
fn block_on<F: Future<Output = ExitCode>>(f: F) -> ExitCode {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(f),
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Prints an error response the way every command reports failures.
fn print_error(response: &IpcResponse) {
    let message = response.error.as_deref().unwrap_or("unknown error");
    match response.code.as_deref() {
        Some(code) => eprintln!("Error [{}]: {}", code, message),
        None => eprintln!("Error: {}", message),
    }
}

/// Sends `cmd` and maps the response to an exit code.
async fn send_command(connected: ClientResult<Client>, cmd: &IpcCommand) -> ExitCode {
    let mut client = match connected {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match client.request(cmd).await {
        Ok(response) if response.ok => ExitCode::SUCCESS,
        Ok(response) => {
            print_error(&response);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sends a connect command, starting the daemon first if needed.
pub(crate) fn run_connect_command(
    socket: &Path,
    config_path: Option<&Path>,
    cmd: IpcCommand,
) -> ExitCode {
    block_on(async {
        let connected = client::connect_with_lazy_start(socket, config_path).await;
        send_command(connected, &cmd).await
    })
}

pub(crate) fn run_disconnect_command(socket: &Path) -> ExitCode {
    block_on(async {
        let cmd = IpcCommand::new(IpcCommandKind::Disconnect);
        send_command(client::connect(socket).await, &cmd).await
    })
}

pub(crate) fn run_send_command(socket: &Path, message: &str) -> ExitCode {
    block_on(async {
        let cmd = IpcCommand::new(IpcCommandKind::SendMessage).param("message", message);
        send_command(client::connect(socket).await, &cmd).await
    })
}

/// Sends `status` and prints daemon health plus the connection snapshot.
///
/// Returns `ExitCode::FAILURE` when the daemon is unreachable.
pub(crate) fn run_status_command(socket: &Path, json: bool) -> ExitCode {
    block_on(async {
        let mut client = match client::connect(socket).await {
            Ok(client) => client,
            Err(_) => {
                println!("ws-keeper daemon");
                println!("  Status:      not running");
                return ExitCode::FAILURE;
            }
        };

        let response = match client.request(&IpcCommand::new(IpcCommandKind::Status)).await {
            Ok(response) => response,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if !response.ok {
            print_error(&response);
            return ExitCode::FAILURE;
        }

        let Some(data) = response.data else {
            eprintln!("Unexpected response: no data in status response");
            return ExitCode::FAILURE;
        };
        if json {
            println!("{}", data);
            return ExitCode::SUCCESS;
        }
        match serde_json::from_value::<DaemonStatus>(data) {
            Ok(status) => {
                print!("{}", format_status(&status));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to parse status data: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}

/// Human-readable status report.
fn format_status(status: &DaemonStatus) -> String {
    let connection = &status.connection;
    let uptime = humantime::format_duration(Duration::from_secs(status.uptime_seconds));
    let mut out = String::new();
    out.push_str("ws-keeper daemon\n");
    out.push_str("  Status:      running\n");
    out.push_str(&format!("  Uptime:      {}\n", uptime));
    out.push_str(&format!("  Clients:     {}\n", status.clients));
    out.push_str(&format!(
        "  Subscriber:  {}\n",
        if status.subscribed { "yes" } else { "no" }
    ));
    out.push_str(&format!("  Socket:      {}\n", status.socket_path));
    out.push_str(&format!(
        "  Connection:  {} (generation {})\n",
        connection.phase, connection.generation
    ));
    out.push_str(&format!(
        "  Target:      {}\n",
        connection.target.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("  Reconnects:  {}\n", connection.reconnect_attempts));
    out
}

/// One output line for a notification.
fn format_notification(notification: &IpcNotification, json: bool) -> String {
    if json {
        return notification.to_json_line().trim_end().to_string();
    }
    match (&notification.is_connected, &notification.message) {
        (Some(true), _) => "status: connected".to_string(),
        (Some(false), _) => "status: disconnected".to_string(),
        (None, Some(message)) => format!("message: {}", message),
        (None, None) => format!("{}: (empty)", notification.notification_type),
    }
}

/// Subscribes and prints events until Ctrl+C or the stream ends.
///
/// Only one watcher receives events at a time; starting another ends this one.
pub(crate) fn run_watch_command(socket: &Path, config_path: Option<&Path>, json: bool) -> ExitCode {
    block_on(async {
        let connected = match client::connect_with_lazy_start(socket, config_path).await {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        let (ack, mut events) = match connected.subscribe().await {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if !ack.ok {
            print_error(&ack);
            return ExitCode::FAILURE;
        }

        loop {
            tokio::select! {
                next = events.next() => match next {
                    Ok(Some(notification)) => {
                        println!("{}", format_notification(&notification, json));
                    }
                    Ok(None) => {
                        eprintln!("Event stream ended (daemon stopped or another watcher took over)");
                        return ExitCode::SUCCESS;
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
                _ = tokio::signal::ctrl_c() => return ExitCode::SUCCESS,
            }
        }
    })
}

//! Client connection functionality with lazy-start capability.
//!
//! This module provides the core connection logic for the client, including
//! automatic daemon startup when the daemon is not running, and the JSON
//! Lines request/response exchange on top of the socket.

use std::env::current_exe;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::sleep;

use crate::client::ClientResult;
use crate::config::xdg::absolute;
use crate::ipc::{IpcCommand, IpcCommandKind, IpcNotification, IpcResponse};

/// Error types for client operations.
#[derive(Debug)]
pub enum ClientError {
    /// The daemon failed to start within the timeout period.
    ///
    /// Contains the last connection error for diagnostic purposes.
    DaemonStartFailed {
        /// Number of connection attempts made.
        attempts: u32,
        /// The last error encountered during retry attempts.
        last_error: Option<std::io::Error>,
    },

    /// Connection failed with an error that starting the daemon cannot fix
    /// (e.g., permission denied, invalid path).
    ConnectionFailed(std::io::Error),

    /// Failed to spawn the daemon process.
    SpawnFailed(std::io::Error),

    /// Failed to determine the current executable path.
    ExecutableNotFound(std::io::Error),

    /// The daemon closed the socket before answering.
    Disconnected,

    /// The daemon sent a line that is not valid protocol JSON.
    InvalidResponse(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::DaemonStartFailed {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Daemon failed to start after {} attempts. \
                    Last error: {}. \
                    Try: 1) Check socket path permissions, 2) Check for existing daemon, \
                    3) Verify binary has execute permissions",
                    attempts,
                    last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                )
            }
            ClientError::ConnectionFailed(e) => {
                write!(
                    f,
                    "Connection to daemon failed: {}. \
                    This error cannot be resolved by lazy-starting the daemon",
                    e
                )
            }
            ClientError::SpawnFailed(e) => {
                write!(f, "Failed to spawn daemon process: {}", e)
            }
            ClientError::ExecutableNotFound(e) => {
                write!(f, "Failed to find current executable: {}", e)
            }
            ClientError::Disconnected => {
                write!(f, "Daemon closed the connection")
            }
            ClientError::InvalidResponse(e) => {
                write!(f, "Failed to parse daemon response: {}", e)
            }
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::DaemonStartFailed { last_error, .. } => {
                last_error.as_ref().map(|e| e as &(dyn Error + 'static))
            }
            ClientError::ConnectionFailed(e) => Some(e),
            ClientError::SpawnFailed(e) => Some(e),
            ClientError::ExecutableNotFound(e) => Some(e),
            ClientError::Disconnected => None,
            ClientError::InvalidResponse(e) => Some(e),
        }
    }
}

/// Client for communicating with the ws-keeper daemon.
///
/// Wraps a Unix socket connection and exchanges one JSON line per request.
#[derive(Debug)]
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Creates a new `Client` from an established `UnixStream` connection.
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn write_command(&mut self, cmd: &IpcCommand) -> ClientResult<()> {
        self.writer.write_all(cmd.to_json_line().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads the next non-empty line, or `None` once the daemon hangs up.
    async fn read_line(&mut self) -> ClientResult<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    }

    /// Sends one command and waits for its response.
    pub async fn request(&mut self, cmd: &IpcCommand) -> ClientResult<IpcResponse> {
        self.write_command(cmd).await?;
        let line = self.read_line().await?.ok_or(ClientError::Disconnected)?;
        let response =
            serde_json::from_str(line.trim()).map_err(ClientError::InvalidResponse)?;
        Ok(response)
    }

    /// Turns this connection into an event stream.
    ///
    /// Returns the daemon's answer to `subscribe` alongside the stream. When
    /// the answer is an error the stream yields nothing.
    pub async fn subscribe(mut self) -> ClientResult<(IpcResponse, Subscription)> {
        let response = self.request(&IpcCommand::new(IpcCommandKind::Subscribe)).await?;
        Ok((response, Subscription { client: self }))
    }
}

/// Event stream returned by [`Client::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    client: Client,
}

impl Subscription {
    /// Waits for the next notification. `None` means the stream ended, either
    /// because the daemon stopped or another subscriber took over.
    pub async fn next(&mut self) -> ClientResult<Option<IpcNotification>> {
        match self.client.read_line().await? {
            Some(line) => {
                let notification =
                    serde_json::from_str(line.trim()).map_err(ClientError::InvalidResponse)?;
                Ok(Some(notification))
            }
            None => Ok(None),
        }
    }
}

/// Backoff configuration for connection retries.
const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 500;
const MAX_RETRIES: u32 = 10;

/// Connects to a running daemon without trying to start one.
pub async fn connect(socket_path: &Path) -> ClientResult<Client> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(ClientError::ConnectionFailed)?;
    tracing::debug!("Connected to existing daemon at {:?}", socket_path);
    Ok(Client::new(stream))
}

/// Connects to the daemon, automatically starting it if not running.
///
/// If the socket is missing or refuses connections, spawns `wsk daemon
/// --daemonize` on the same socket (forwarding `config_path` when given) and
/// retries with exponential backoff:
/// - Initial delay: 10ms
/// - Maximum delay: 500ms
/// - Maximum retries: 10
///
/// If multiple clients race here, the socket binding acts as a mutex and
/// only one daemon survives.
pub async fn connect_with_lazy_start(
    socket_path: &Path,
    config_path: Option<&Path>,
) -> ClientResult<Client> {
    match UnixStream::connect(socket_path).await {
        Ok(stream) => {
            tracing::debug!("Connected to existing daemon at {:?}", socket_path);
            return Ok(Client::new(stream));
        }
        Err(e) => match e.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "Daemon not running at {:?} ({}), attempting lazy-start",
                    socket_path,
                    e
                );
            }
            _ => {
                tracing::error!(
                    "Connection to daemon at {:?} failed with non-recoverable error: {}",
                    socket_path,
                    e
                );
                return Err(Box::new(ClientError::ConnectionFailed(e)));
            }
        },
    }

    spawn_daemon(socket_path, config_path)?;

    let mut last_error: Option<std::io::Error> = None;

    for attempt in 0..MAX_RETRIES {
        let delay = calculate_backoff(attempt);
        sleep(delay).await;

        match UnixStream::connect(socket_path).await {
            Ok(stream) => {
                tracing::info!("Connected to daemon after {} retries", attempt + 1);
                return Ok(Client::new(stream));
            }
            Err(e) => {
                tracing::debug!(
                    "Connection attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                last_error = Some(e);
            }
        }
    }

    Err(Box::new(ClientError::DaemonStartFailed {
        attempts: MAX_RETRIES,
        last_error,
    }))
}

/// Arguments for the detached daemon started by [`connect_with_lazy_start`].
///
/// Paths are made absolute because the daemon leaves the caller's working
/// directory when it detaches.
fn daemon_args(socket_path: &Path, config_path: Option<&Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut args: Vec<PathBuf> = ["daemon", "--daemonize", "--socket"]
        .into_iter()
        .map(PathBuf::from)
        .collect();
    args.push(absolute(socket_path.to_path_buf())?);
    if let Some(config) = config_path {
        args.push(PathBuf::from("--config"));
        args.push(absolute(config.to_path_buf())?);
    }
    Ok(args)
}

/// Spawns the daemon process in the background.
///
/// Only spawns the process; it does not wait for the daemon to be ready.
fn spawn_daemon(socket_path: &Path, config_path: Option<&Path>) -> Result<(), ClientError> {
    let exe = current_exe().map_err(ClientError::ExecutableNotFound)?;

    tracing::info!("Spawning daemon from {:?}", exe);

    let args = daemon_args(socket_path, config_path).map_err(ClientError::SpawnFailed)?;
    let child = Command::new(&exe)
        .args(args)
        .spawn()
        .map_err(ClientError::SpawnFailed)?;

    tracing::info!("Daemon spawned successfully with PID {}", child.id());
    Ok(())
}

/// Calculates the backoff delay for a given zero-indexed attempt.
fn calculate_backoff(attempt: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(1 << attempt);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

//! Unix Socket Server for IPC
//!
//! This module implements the Unix socket server that lets `wsk` commands
//! drive the background connection manager.
//!
//! Each client connection speaks JSON Lines: one [`IpcCommand`] per line in,
//! one [`IpcResponse`] per line out. A `subscribe` command turns the
//! connection into an event stream until the client hangs up.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//! use ws_keeper::bridge::EventBridge;
//! use ws_keeper::control::ControlSurface;
//! use ws_keeper::daemon::SocketServer;
//! use ws_keeper::manager::{ConnectionManager, ManagerConfig};
//! use ws_keeper::transport::WsClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let bridge = EventBridge::new();
//!     let manager = ConnectionManager::spawn(
//!         Arc::new(WsClient::new()),
//!         bridge.clone(),
//!         ManagerConfig::default(),
//!     );
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!     let mut server = SocketServer::new(
//!         "/tmp/wsk.sock".to_string(),
//!         ControlSurface::new(manager),
//!         bridge,
//!     );
//!     server.start().await?;
//!     server.run_with_shutdown(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use super::handlers::{handle_command, handle_subscribe_command, DaemonState};
use crate::bridge::EventBridge;
use crate::control::ControlSurface;
use crate::ipc::{IpcCommand, IpcCommandKind, IpcResponse};

/// Unix socket server for daemon IPC.
///
/// The `SocketServer` handles:
/// - Socket creation and binding
/// - Stale socket cleanup on startup
/// - Graceful socket cleanup on shutdown (via Drop)
/// - Concurrent client management
pub struct SocketServer {
    /// Path to the Unix socket file
    socket_path: String,
    /// The Unix listener, set after start() is called
    listener: Option<UnixListener>,
    control: ControlSurface,
    bridge: EventBridge,
    /// Timestamp when the server was created (for uptime calculation).
    start_time: Instant,
    /// Count of currently active client connections.
    active_connections: Arc<AtomicUsize>,
}

impl SocketServer {
    /// Creates a new `SocketServer` with the specified socket path.
    ///
    /// The server is not started until `start()` is called.
    pub fn new(socket_path: String, control: ControlSurface, bridge: EventBridge) -> Self {
        tracing::debug!("Creating SocketServer with path: {}", socket_path);
        Self {
            socket_path,
            listener: None,
            control,
            bridge,
            start_time: Instant::now(),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the configured socket path.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Returns the count of active connections.
    pub fn active_connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Cleans up a stale socket file from a previous daemon crash.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` with `AddrInUse` if another daemon is already running.
    async fn cleanup_stale_socket(&self) -> std::io::Result<()> {
        let path = Path::new(&self.socket_path);

        if path.exists() {
            tracing::debug!(
                "Socket file exists at {}, checking if daemon is running",
                self.socket_path
            );

            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => {
                    tracing::error!("Another daemon is already running at {}", self.socket_path);
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        "Another daemon is already running",
                    ));
                }
                Err(_) => {
                    tracing::info!("Removing stale socket file at {}", self.socket_path);
                    fs::remove_file(path)?;
                }
            }
        }

        Ok(())
    }

    /// Starts the server by cleaning up any stale socket and binding to the socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if another daemon is already running, the stale socket
    /// cannot be removed, or the path cannot be bound.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.cleanup_stale_socket().await?;

        if let Some(parent) = Path::new(&self.socket_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Binding to socket: {}", self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        self.listener = Some(listener);

        tracing::info!("Socket server started at {}", self.socket_path);
        Ok(())
    }

    /// Runs the accept loop until a shutdown signal is received.
    ///
    /// Each client connection is handled in its own Tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if called before `start()`.
    pub async fn run_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = self
            .listener
            .as_ref()
            .ok_or("Server not started - call start() first")?;

        tracing::info!("Socket server running with shutdown support...");

        let daemon_state = DaemonState {
            control: self.control.clone(),
            bridge: self.bridge.clone(),
            start_time: self.start_time,
            active_connections: Arc::clone(&self.active_connections),
            socket_path: self.socket_path.clone(),
        };

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            tracing::debug!("Accepted new client connection");
                            let state = daemon_state.clone();
                            tokio::spawn(async move {
                                state.active_connections.fetch_add(1, Ordering::Relaxed);
                                let result = handle_client(stream, &state).await;
                                state.active_connections.fetch_sub(1, Ordering::Relaxed);
                                if let Err(e) = result {
                                    tracing::warn!("Client handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Drop for SocketServer {
    /// Cleans up the socket file on drop (best-effort).
    fn drop(&mut self) {
        // Only the server that bound the socket owns the file.
        if self.listener.is_none() {
            return;
        }
        let path = Path::new(&self.socket_path);
        if path.exists() {
            tracing::debug!("Cleaning up socket file: {}", self.socket_path);
            if let Err(e) = fs::remove_file(path) {
                tracing::error!(
                    "Failed to remove socket file '{}': {}. \
                    Next daemon start may fail. Manually remove the file if needed.",
                    self.socket_path,
                    e
                );
            }
        }
    }
}

/// Handles a single client connection.
///
/// Reads one JSON command per line and writes one JSON response per line.
/// Malformed lines get an `INVALID_ARGUMENT` response and the connection
/// stays open. `subscribe` hands the connection over to the event stream.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
async fn handle_client(
    stream: UnixStream,
    state: &DaemonState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    tracing::debug!("Client handler started");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            tracing::debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(trimmed) {
            Ok(cmd) => cmd,
            Err(e) => {
                let response =
                    IpcResponse::error("INVALID_ARGUMENT", format!("malformed command: {}", e));
                writer.write_all(response.to_json_line().as_bytes()).await?;
                writer.flush().await?;
                continue;
            }
        };

        tracing::debug!(cmd = %cmd.cmd, "command received");

        if cmd.cmd == IpcCommandKind::Subscribe.as_str() {
            handle_subscribe_command(&state.bridge, &mut reader, &mut writer).await?;
            break;
        }

        let response = handle_command(&cmd, state).await;
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{ConnectionManager, ManagerConfig};
    use crate::transport::mock::MockClient;

    fn create_server(path: String) -> SocketServer {
        let bridge = EventBridge::new();
        let manager = ConnectionManager::spawn(
            Arc::new(MockClient::new()),
            bridge.clone(),
            ManagerConfig::default(),
        );
        SocketServer::new(path, ControlSurface::new(manager), bridge)
    }

    #[tokio::test]
    async fn test_socket_server_new() {
        let server = create_server("/tmp/test-socket.sock".to_string());
        assert_eq!(server.socket_path(), "/tmp/test-socket.sock");
        assert!(server.listener.is_none());
        assert_eq!(server.active_connection_count(), 0);
    }

    #[tokio::test]
    async fn run_before_start_is_an_error() {
        let server = create_server("/tmp/never-bound.sock".to_string());
        let (_tx, rx) = broadcast::channel(1);
        assert!(server.run_with_shutdown(rx).await.is_err());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stale.sock");
        fs::write(&path, b"").expect("write stale file");

        let mut server = create_server(path.to_string_lossy().into_owned());
        server.start().await.expect("start over stale file");
        assert!(server.listener.is_some());

        drop(server);
        assert!(!path.exists(), "socket removed on drop");
    }

    #[tokio::test]
    async fn second_server_on_live_socket_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("live.sock").to_string_lossy().into_owned();

        let mut first = create_server(path.clone());
        first.start().await.expect("first start");

        let mut second = create_server(path.clone());
        let err = second.start().await.unwrap_err();
        let io = err.downcast_ref::<std::io::Error>().expect("io error");
        assert_eq!(io.kind(), std::io::ErrorKind::AddrInUse);

        drop(second);
        assert!(Path::new(&path).exists(), "loser must not remove live socket");
    }
}

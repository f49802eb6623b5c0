//! Daemon module for ws-keeper.
//!
//! This module provides process lifecycle management, daemonization, and the
//! main entry point for running the daemon. The daemon owns one
//! [`ConnectionManager`] and exposes it through the socket server.

mod handlers;
pub mod logging;
pub mod server;
pub use server::SocketServer;

use std::error::Error;
use std::sync::Arc;

use fork::{daemon, Fork};
use tokio::runtime::Runtime;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bridge::EventBridge;
use crate::control::ControlSurface;
use crate::manager::{ConnectionManager, ManagerConfig};
use crate::reconnect::ReconnectPolicy;
use crate::target::TargetBuilder;
use crate::transport::{SocketClient, WsClient};
use crate::DaemonConfig;

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, Box<dyn Error>>;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
///
/// Falls back to SIGINT only if the SIGTERM handler cannot be registered.
async fn wait_for_shutdown() {
    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received SIGINT (Ctrl+C), shutting down");
                },
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                },
            }
        }
        Err(e) => {
            warn!(error = %e, "could not register SIGTERM handler, using SIGINT only");
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed waiting for SIGINT");
            } else {
                info!("received SIGINT (Ctrl+C), shutting down");
            }
        }
    }
}

/// Daemonize the current process.
///
/// The parent process exits immediately with code 0, and the child
/// continues execution as a background daemon.
///
/// # Note
///
/// This function MUST be called BEFORE starting the Tokio runtime,
/// as forking after Tokio initialization corrupts global state for
/// signal handling.
pub fn daemonize_process(nochdir: bool, noclose: bool) -> DaemonResult<()> {
    match daemon(nochdir, noclose) {
        Ok(Fork::Child) => Ok(()),
        Ok(Fork::Parent(_)) => {
            std::process::exit(0);
        }
        Err(e) => Err(Box::new(std::io::Error::other(format!(
            "Failed to daemonize: {}",
            e
        )))),
    }
}

/// Manager settings derived from the daemon configuration.
pub fn manager_config(config: &DaemonConfig) -> ManagerConfig {
    ManagerConfig {
        policy: ReconnectPolicy::new(config.reconnect_delay),
        builder: TargetBuilder::new(config.query_encoding),
    }
}

/// Runs the socket server and connection manager until `shutdown_rx` fires.
///
/// The managed connection is torn down (close code 1000) before returning.
/// Must be called inside a Tokio runtime.
pub async fn serve(
    config: &DaemonConfig,
    client: Arc<dyn SocketClient>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let bridge = EventBridge::new();
    let manager = ConnectionManager::spawn(client, bridge.clone(), manager_config(config));

    let mut server = SocketServer::new(
        config.socket_path.to_string_lossy().to_string(),
        ControlSurface::new(manager.clone()),
        bridge.clone(),
    );

    let result = match server.start().await {
        Ok(()) => server.run_with_shutdown(shutdown_rx).await,
        Err(e) => Err(e),
    };

    if let Err(e) = manager.shutdown().await {
        warn!(error = %e, "connection manager already stopped");
    }
    bridge.clear();
    result
}

/// Run the daemon with the given configuration.
///
/// Performs daemonization if requested, then starts the Tokio runtime and
/// serves until SIGINT or SIGTERM.
///
/// # Example
///
/// ```no_run
/// use ws_keeper::{DaemonConfig, daemon::run_daemon};
/// use std::path::PathBuf;
///
/// let config = DaemonConfig::new(
///     PathBuf::from("/tmp/wsk.sock"),
///     false, // foreground mode
/// );
/// run_daemon(config).expect("Failed to run daemon");
/// ```
pub fn run_daemon(config: DaemonConfig) -> DaemonResult<()> {
    // CRITICAL: Daemonize BEFORE starting Tokio runtime
    if config.daemonize {
        // Production mode: change to /, redirect stdio to /dev/null
        daemonize_process(false, false)?;
    }

    // Initialize logging after daemonize (stderr may be redirected)
    logging::init(config.log_level.as_filter());

    info!(
        socket_path = %config.socket_path.display(),
        daemonize = config.daemonize,
        reconnect_delay = %humantime::format_duration(config.reconnect_delay),
        "ws-keeper daemon starting"
    );

    let runtime = Runtime::new().map_err(|e| {
        Box::new(std::io::Error::other(format!(
            "Failed to create Tokio runtime: {}",
            e
        ))) as Box<dyn Error>
    })?;

    info!("daemon running, press Ctrl+C or send SIGTERM to stop");

    let result = runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            wait_for_shutdown().await;
            let _ = shutdown_tx.send(());
        });

        serve(&config, Arc::new(WsClient::new()), shutdown_rx).await
    });

    match result {
        Ok(()) => {
            info!("daemon stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "daemon failed");
            Err(e as Box<dyn Error>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{IpcCommand, IpcCommandKind, IpcResponse};
    use crate::transport::mock::MockClient;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    #[test]
    fn manager_config_follows_daemon_config() {
        let mut config = DaemonConfig::new(PathBuf::from("/tmp/test.sock"), false);
        config.reconnect_delay = Duration::from_millis(250);
        let manager = manager_config(&config);
        assert_eq!(manager.policy.delay(), Duration::from_millis(250));
        assert_eq!(manager.builder.encoding(), config.query_encoding);
    }

    #[tokio::test]
    async fn serve_closes_connection_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("wsk.sock");
        let config = DaemonConfig::new(socket.clone(), false);
        let client = MockClient::new();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mock: Arc<dyn SocketClient> = Arc::new(client.clone());
        let task = tokio::spawn(async move { serve(&config, mock, shutdown_rx).await });

        let mut stream = loop {
            match UnixStream::connect(&socket).await {
                Ok(s) => break s,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        };
        let line = IpcCommand::new(IpcCommandKind::ConnectDirect)
            .param("url", "ws://example.test/ws")
            .to_json_line();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        let response: IpcResponse = serde_json::from_str(&response).unwrap();
        assert!(response.ok);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(client.closes().len(), 1);
        assert_eq!(client.closes()[0].1, crate::manager::NORMAL_CLOSURE);
        assert!(!socket.exists());
    }
}

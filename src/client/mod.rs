//! Client side of the daemon socket.
//!
//! Used by the `wsk` subcommands. [`connect_with_lazy_start`] spawns the
//! daemon in the background when nothing is listening yet, so the first
//! `wsk connect` also starts the daemon.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use ws_keeper::client::connect_with_lazy_start;
//! use ws_keeper::ipc::{IpcCommand, IpcCommandKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let mut client = connect_with_lazy_start(Path::new("/tmp/wsk.sock"), None).await?;
//! let cmd = IpcCommand::new(IpcCommandKind::ConnectDirect).param("url", "wss://example.com/ws");
//! let response = client.request(&cmd).await?;
//! assert!(response.ok);
//! # Ok(())
//! # }
//! ```

pub mod connection;

pub use connection::{connect, connect_with_lazy_start, Client, ClientError, Subscription};

use std::error::Error;

/// Result type alias for client operations.
///
/// `Send + Sync` so results can cross tasks on the multi-threaded runtime.
pub type ClientResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

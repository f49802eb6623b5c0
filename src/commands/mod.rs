//! Command implementations for the wsk CLI.
//!
//! This module contains all command handler functions, organized by domain:
//! - `daemon` - Daemon startup and socket resolution
//! - `ipc` - Commands sent to the daemon (connect, send, status, watch)
//! - `config` - Configuration file management

pub(crate) mod config;
pub(crate) mod daemon;
pub(crate) mod ipc;

pub(crate) use config::*;
pub(crate) use daemon::*;
pub(crate) use ipc::*;

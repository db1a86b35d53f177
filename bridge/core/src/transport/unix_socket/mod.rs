//! Unix Socket Transport
//!
//! Transport for a controller and its displays living in separate
//! processes on the same host.
//!
//! # Socket Location
//!
//! Default: `$XDG_RUNTIME_DIR/surface-bridge/bridge.sock`
//! Fallback: `/tmp/surface-bridge-$UID/bridge.sock`
//!
//! # Security
//!
//! - Socket created with mode 0600 (owner-only access)
//! - Peer UID validated via `SO_PEERCRED` (Linux)
//! - No network exposure (Unix domain sockets only)
//!
//! # Sessions
//!
//! Each accepted connection is one session. The server asks its
//! [`SessionProvider`](crate::provider::SessionProvider) for the payload,
//! registers it, and drops it again when the connection ends.
//!
//! ```text
//! ┌───────────────────┐                    ┌──────────────────┐
//! │  Display process  │                    │    Controller    │
//! │                   │                    │                  │
//! │UnixSocketChannel  ├───────────────────►│ UnixSocketServer │
//! │                   │    Unix Socket     │                  │
//! │   RequestFrame ─► │    bridge.sock     │ ◄─ RequestFrame  │
//! │ ◄─ ResponseFrame  │                    │ ResponseFrame ─► │
//! └───────────────────┘                    └──────────────────┘
//! ```

mod client;
mod server;

pub use client::UnixSocketChannel;
pub use server::UnixSocketServer;

use std::path::PathBuf;

/// Get the default socket path for the bridge
#[must_use]
pub fn default_socket_path() -> PathBuf {
    super::config::default_socket_path()
}

//! Transport Configuration
//!
//! Settings for the socket transport. The TOML and environment layering
//! lives in [`crate::config`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default cap on simultaneous display connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Default capacity of per-connection queues
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Unix socket path the controller listens on
    pub socket_path: PathBuf,

    /// Maximum simultaneous display connections (sessions)
    pub max_connections: usize,

    /// Capacity of per-connection outbound queues
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Configuration listening on a specific socket path
    pub fn at(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }
}

/// Get the default Unix socket path
///
/// Uses `XDG_RUNTIME_DIR` if available, otherwise /tmp/surface-bridge-$UID/
#[must_use]
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("surface-bridge")
            .join("bridge.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/surface-bridge-{uid}/bridge.sock"))
    }
}

//! Transport Layer for Controller-Display IPC
//!
//! Provides abstraction over the channel a display uses to reach its
//! controller:
//! - `InProcess`: Direct channel communication (embedded mode)
//! - `UnixSocket`: Local IPC via Unix domain sockets
//!
//! Both implement [`DisplayChannel`], so the display-side client does not
//! care which one it is given.
//!
//! # Security
//!
//! - Unix sockets use `SO_PEERCRED` to validate peer UID
//! - Socket files are created with 0600 permissions
//! - No network exposure

pub mod config;
pub mod frame;
pub mod in_process;
pub mod traits;
#[cfg(unix)]
pub mod unix_socket;

// Re-exports for convenience
pub use config::{default_socket_path, TransportConfig};
pub use frame::{encode, FrameDecoder, MAX_FRAME_SIZE};
pub use in_process::InProcessChannel;
pub use traits::{DisplayChannel, TransportError};

#[cfg(unix)]
pub use unix_socket::{UnixSocketChannel, UnixSocketServer};

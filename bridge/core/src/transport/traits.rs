//! Transport Traits
//!
//! The display side talks to the controller through a [`DisplayChannel`]:
//! a reliable request/response channel bound to exactly one session.
//! The channel, not the display code, decides which session a request
//! belongs to.

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{BridgeRequest, BridgeResponse};
use crate::registry::SessionId;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to peer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,
    /// Failed to send a request or response
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Frame payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Frame larger than the protocol allows
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Announced or encoded size
        size: usize,
        /// Allowed maximum
        max: usize,
    },
    /// Peer was not allowed to connect
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// IO error from underlying transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Transport not in expected state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Frame checksum mismatch - data corruption detected
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum value
        expected: u32,
        /// Actual checksum value received
        actual: u32,
    },
}

impl TransportError {
    /// Whether the byte stream can no longer be trusted after this error
    #[must_use]
    pub fn is_stream_corrupt(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::FrameTooLarge { .. }
        )
    }
}

/// Display-side end of a session channel
#[async_trait]
pub trait DisplayChannel: Send + Sync {
    /// Send a request and wait for its response
    ///
    /// Requests may be issued concurrently; each resolves with its own
    /// response regardless of completion order.
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse, TransportError>;

    /// Session this channel is bound to, if the display side knows it
    fn session_id(&self) -> Option<SessionId> {
        None
    }
}

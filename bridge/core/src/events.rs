//! Bridge Error Events
//!
//! The bridge swallows data errors so that every caller gets a response.
//! Each swallowed error is still logged and published here as a structured
//! event, so a host application can watch the error rate.
//!
//! ```ignore
//! let mut errors = controller.subscribe_errors();
//! tokio::spawn(async move {
//!     while let Ok(event) = errors.recv().await {
//!         metrics.record(event.kind);
//!     }
//! });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::registry::SessionId;

/// Default capacity of the error event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// What went wrong
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeErrorKind {
    /// Invocation arguments were not a JSON array
    MalformedArguments,
    /// Request for a session with nothing registered
    UnknownSession,
    /// Request for an operation the session does not have
    UnknownOperation,
    /// The operation returned an error or panicked
    OperationFailed,
    /// A value had no wire representation
    NotRepresentable,
    /// A manifest could not be parsed
    MalformedManifest,
    /// An invocation result could not be parsed
    MalformedResult,
    /// The channel failed to deliver a request or response
    ChannelFailed,
    /// A deadline expired
    Timeout,
}

impl fmt::Display for BridgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedArguments => "malformed_arguments",
            Self::UnknownSession => "unknown_session",
            Self::UnknownOperation => "unknown_operation",
            Self::OperationFailed => "operation_failed",
            Self::NotRepresentable => "not_representable",
            Self::MalformedManifest => "malformed_manifest",
            Self::MalformedResult => "malformed_result",
            Self::ChannelFailed => "channel_failed",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// One swallowed error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeErrorEvent {
    /// Session involved, when known
    pub session_id: Option<SessionId>,
    /// Operation involved, when relevant
    pub operation: Option<String>,
    /// Error category
    pub kind: BridgeErrorKind,
    /// Human-readable detail
    pub detail: String,
}

impl BridgeErrorEvent {
    /// Create an event
    pub fn new(kind: BridgeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            session_id: None,
            operation: None,
            kind,
            detail: detail.into(),
        }
    }

    /// Attach the session
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach the operation name
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

/// Fan-out of error events with a running total
#[derive(Clone, Debug)]
pub struct ErrorEvents {
    tx: broadcast::Sender<BridgeErrorEvent>,
    total: Arc<AtomicU64>,
}

impl ErrorEvents {
    /// Create a hub holding up to `capacity` undelivered events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeErrorEvent> {
        self.tx.subscribe()
    }

    /// Log and publish an event
    pub fn emit(&self, event: BridgeErrorEvent) {
        self.total.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            kind = %event.kind,
            session_id = ?event.session_id,
            operation = event.operation.as_deref().unwrap_or(""),
            detail = %event.detail,
            "Bridge error"
        );
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Number of events emitted so far
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for ErrorEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

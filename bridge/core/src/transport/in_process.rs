//! In-Process Transport
//!
//! Direct channel-based communication for embedded mode, where the display
//! side runs in the same process as the controller. Requests still go
//! through a queue and a serve task, so the display code sees the same
//! asynchronous request/response behaviour as over a socket.
//!
//! # Usage
//!
//! ```ignore
//! let controller = BridgeController::default();
//! let session = SessionId::new();
//! controller.register(session, payload)?;
//!
//! let channel = InProcessChannel::bind(controller, session);
//! let client = BridgeClient::new(Arc::new(channel), ClientConfig::default());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::controller::BridgeController;
use crate::protocol::{BridgeRequest, BridgeResponse};
use crate::registry::SessionId;

use super::config::DEFAULT_CHANNEL_CAPACITY;
use super::traits::{DisplayChannel, TransportError};

/// A queued request and where to send its answer
struct InboundRequest {
    request: BridgeRequest,
    reply: oneshot::Sender<BridgeResponse>,
}

/// Display-side channel bound to a controller in the same process
#[derive(Debug, Clone)]
pub struct InProcessChannel {
    session_id: SessionId,
    tx: mpsc::Sender<InboundRequest>,
    connected: Arc<AtomicBool>,
}

impl InProcessChannel {
    /// Bind a channel for `session_id` and spawn its serve task
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn bind(controller: BridgeController, session_id: SessionId) -> Self {
        Self::bind_with_capacity(controller, session_id, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bind with a custom request queue capacity
    #[must_use]
    pub fn bind_with_capacity(
        controller: BridgeController,
        session_id: SessionId,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<InboundRequest>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                let controller = controller.clone();
                // One task per request so a slow operation does not hold up others
                tokio::spawn(async move {
                    let response = controller.handle(session_id, inbound.request).await;
                    if inbound.reply.send(response).is_err() {
                        tracing::debug!(session_id = %session_id, "Requester gone before reply");
                    }
                });
            }
            tracing::debug!(session_id = %session_id, "In-process channel closed");
        });

        tracing::debug!(session_id = %session_id, "In-process channel bound");

        Self {
            session_id,
            tx,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop accepting requests on this channel (and its clones)
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Whether requests are accepted
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

#[async_trait]
impl DisplayChannel for InProcessChannel {
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState(
                "Channel not connected".to_string(),
            ));
        }

        let (reply, response) = oneshot::channel();
        self.tx
            .send(InboundRequest { request, reply })
            .await
            .map_err(|_| TransportError::SendFailed("Channel closed".to_string()))?;

        response.await.map_err(|_| TransportError::ConnectionClosed)
    }

    fn session_id(&self) -> Option<SessionId> {
        Some(self.session_id)
    }
}

//! Unix Socket Client Transport
//!
//! Display-side implementation of the Unix socket transport. Requests are
//! multiplexed over one connection; responses are matched back to their
//! callers by [`RequestId`], so they may arrive in any order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{BridgeRequest, BridgeResponse, RequestFrame, RequestId, ResponseFrame};
use crate::transport::config::DEFAULT_CHANNEL_CAPACITY;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::{DisplayChannel, TransportError};

type PendingMap = DashMap<RequestId, oneshot::Sender<BridgeResponse>>;

/// Removes a pending entry when the request finishes or is cancelled
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Display-side channel over a Unix socket
///
/// The session is assigned by the server when the connection is accepted.
pub struct UnixSocketChannel {
    /// Path to the controller's socket
    socket_path: PathBuf,
    /// Frames waiting to be written
    outbound: mpsc::Sender<RequestFrame>,
    /// Requests awaiting a response
    pending: Arc<PendingMap>,
    /// Next correlation ID
    next_id: AtomicU64,
    /// Whether the connection is still up
    connected: Arc<AtomicBool>,
}

impl UnixSocketChannel {
    /// Connect to the controller's socket
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if nothing listens at
    /// `socket_path`.
    pub async fn connect(socket_path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let socket_path = socket_path.into();

        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to connect to {}: {e}",
                socket_path.display()
            ))
        })?;

        let (mut read_half, mut write_half) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::channel::<RequestFrame>(DEFAULT_CHANNEL_CAPACITY);
        let pending: Arc<PendingMap> = Arc::new(DashMap::new());
        let connected = Arc::new(AtomicBool::new(true));

        // Read task: stream -> pending callers
        let pending_read = Arc::clone(&pending);
        let connected_read = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];

            'read: loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!("Connection closed by controller");
                        break;
                    }
                    Ok(n) => {
                        decoder.push(&buf[..n]);
                        loop {
                            match decoder.decode::<ResponseFrame>() {
                                Ok(Some(frame)) => {
                                    if let Some((_, caller)) = pending_read.remove(&frame.id) {
                                        // Caller may have timed out already
                                        let _ = caller.send(frame.response);
                                    } else {
                                        tracing::debug!(id = frame.id.0, "Response for unknown request");
                                    }
                                }
                                Ok(None) => break,
                                Err(e) if e.is_stream_corrupt() => {
                                    tracing::warn!(error = %e, "Stream corrupt, closing");
                                    break 'read;
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Skipping malformed frame");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            connected_read.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every waiting caller
            pending_read.clear();
            tracing::info!("Disconnected from controller");
        });

        // Write task: outbound frames -> stream
        let connected_write = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match encode(&frame) {
                    Ok(data) => {
                        if let Err(e) = write_half.write_all(&data).await {
                            tracing::warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Encode error");
                    }
                }
            }

            connected_write.store(false, Ordering::SeqCst);
        });

        tracing::info!(path = %socket_path.display(), "Connected to controller");

        Ok(Self {
            socket_path,
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            connected,
        })
    }

    /// Get the socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether the connection is still up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a response
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl DisplayChannel for UnixSocketChannel {
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        // The reader may have shut down between the check and the insert
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        self.outbound
            .send(RequestFrame { id, request })
            .await
            .map_err(|_| TransportError::SendFailed("Connection closed".to_string()))?;

        rx.await.map_err(|_| TransportError::ConnectionClosed)
    }
}

impl std::fmt::Debug for UnixSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketChannel")
            .field("socket_path", &self.socket_path)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

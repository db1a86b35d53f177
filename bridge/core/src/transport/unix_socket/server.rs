//! Unix Socket Server Transport
//!
//! Controller-side implementation of the Unix socket transport.
//! Every accepted connection becomes a session with its own payload.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};

use crate::controller::BridgeController;
use crate::protocol::{RequestFrame, ResponseFrame};
use crate::provider::SessionProvider;
use crate::registry::SessionId;
use crate::transport::config::TransportConfig;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::TransportError;

/// Facts about a connected display
#[derive(Clone, Copy, Debug)]
struct ConnectionInfo {
    /// Peer process ID, where the platform reports it
    peer_pid: Option<i32>,
}

/// Server-side Unix socket transport for the controller
pub struct UnixSocketServer {
    /// Path to the socket file
    socket_path: PathBuf,
    /// Cap on simultaneous sessions
    max_connections: usize,
    /// Capacity of each connection's outbound queue
    channel_capacity: usize,
    /// The bound listener (None until listen() is called)
    listener: Option<UnixListener>,
    /// Live sessions
    sessions: Arc<DashMap<SessionId, ConnectionInfo>>,
    /// Flipped to true to end every connection
    shutdown_tx: watch::Sender<bool>,
}

impl UnixSocketServer {
    /// Create a new Unix socket server with default limits
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_config(&TransportConfig::at(socket_path))
    }

    /// Create a server from transport settings
    #[must_use]
    pub fn with_config(config: &TransportConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            socket_path: config.socket_path.clone(),
            max_connections: config.max_connections.max(1),
            channel_capacity: config.channel_capacity.max(1),
            listener: None,
            sessions: Arc::new(DashMap::new()),
            shutdown_tx,
        }
    }

    /// Get the socket path
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Number of connected sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Process ID of a connected display, where the platform reports it
    #[must_use]
    pub fn peer_pid(&self, session_id: SessionId) -> Option<i32> {
        self.sessions.get(&session_id).and_then(|info| info.peer_pid)
    }

    /// Bind the socket
    ///
    /// Creates the parent directory, replaces a stale socket file and
    /// restricts the socket to its owner.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the directory, bind or permission
    /// change fails.
    pub fn listen(&mut self) -> Result<(), TransportError> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {e}", parent.display()),
                ))
            })?;
        }

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                TransportError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to remove old socket {}: {e}",
                        self.socket_path.display()
                    ),
                ))
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;

        self.listener = Some(listener);
        self.shutdown_tx.send_replace(false);

        tracing::info!(path = %self.socket_path.display(), "Bridge listening on Unix socket");
        Ok(())
    }

    /// Accept one display connection and start serving it
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidState` if not listening
    /// - `TransportError::AuthenticationFailed` if the peer runs as another user
    /// - `TransportError::ConnectionFailed` if the session limit is reached
    pub async fn accept(
        &self,
        controller: &BridgeController,
        provider: &Arc<dyn SessionProvider>,
    ) -> Result<SessionId, TransportError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("Not listening".to_string()))?;

        let (stream, _addr) = listener.accept().await?;
        let peer_pid = Self::validate_peer(&stream)?;

        if self.sessions.len() >= self.max_connections {
            tracing::warn!(
                max = self.max_connections,
                "Rejecting display: session limit reached"
            );
            return Err(TransportError::ConnectionFailed(format!(
                "session limit of {} reached",
                self.max_connections
            )));
        }

        let session_id = SessionId::new();
        if let Some(payload) = provider.open(session_id) {
            if controller.register(session_id, payload).is_err() {
                tracing::warn!(session_id = %session_id, "Session starts without a payload");
            }
        }
        self.sessions
            .insert(session_id, ConnectionInfo { peer_pid });

        self.spawn_connection(session_id, stream, controller.clone(), Arc::clone(provider));

        tracing::info!(session_id = %session_id, peer_pid = ?peer_pid, "Display connected");
        Ok(session_id)
    }

    /// Accept connections until `shutdown` completes
    ///
    /// Binds the socket first if [`listen`](Self::listen) has not been
    /// called. Per-connection failures are logged and do not stop the loop.
    ///
    /// # Errors
    ///
    /// Returns an error only if binding the socket fails.
    pub async fn serve<F>(
        &mut self,
        controller: BridgeController,
        provider: Arc<dyn SessionProvider>,
        shutdown: F,
    ) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        if self.listener.is_none() {
            self.listen()?;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                accepted = self.accept(&controller, &provider) => {
                    if let Err(e) = accepted {
                        tracing::warn!(error = %e, "Failed to accept display");
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Stop listening, end every connection and remove the socket file
    pub fn shutdown(&mut self) {
        self.listener = None;
        self.shutdown_tx.send_replace(true);

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).ok();
        }

        tracing::info!(sessions = self.sessions.len(), "Unix socket server shut down");
    }

    fn spawn_connection(
        &self,
        session_id: SessionId,
        stream: UnixStream,
        controller: BridgeController,
        provider: Arc<dyn SessionProvider>,
    ) {
        let (mut read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<ResponseFrame>(self.channel_capacity);

        // Write task: responses -> stream
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match encode(&frame) {
                    Ok(data) => {
                        if let Err(e) = write_half.write_all(&data).await {
                            tracing::warn!(session_id = %session_id, error = %e, "Write error");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Encode error");
                    }
                }
            }
        });

        // Read task: stream -> controller, one task per request
        let sessions = Arc::clone(&self.sessions);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];

            'read: loop {
                let n = tokio::select! {
                    read = read_half.read(&mut buf) => match read {
                        Ok(0) => {
                            tracing::debug!(session_id = %session_id, "Connection closed by peer");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Read error");
                            break;
                        }
                    },
                    _ = shutdown_rx.changed() => break,
                };

                decoder.push(&buf[..n]);
                loop {
                    match decoder.decode::<RequestFrame>() {
                        Ok(Some(frame)) => {
                            let controller = controller.clone();
                            let out_tx = out_tx.clone();
                            tokio::spawn(async move {
                                let response = controller.handle(session_id, frame.request).await;
                                let reply = ResponseFrame {
                                    id: frame.id,
                                    response,
                                };
                                if out_tx.send(reply).await.is_err() {
                                    tracing::debug!(session_id = %session_id, "Connection gone before reply");
                                }
                            });
                        }
                        Ok(None) => break,
                        Err(e) if e.is_stream_corrupt() => {
                            tracing::warn!(session_id = %session_id, error = %e, "Stream corrupt, closing");
                            break 'read;
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Skipping malformed frame");
                        }
                    }
                }
            }

            controller.unregister(session_id);
            provider.close(session_id);
            sessions.remove(&session_id);
            tracing::info!(session_id = %session_id, "Display disconnected");
        });
    }

    /// Validate peer credentials
    ///
    /// On Linux, uses `SO_PEERCRED` to verify the connecting process
    /// runs as the same user as the controller.
    #[cfg(target_os = "linux")]
    fn validate_peer(stream: &UnixStream) -> Result<Option<i32>, TransportError> {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();

        let cred = unsafe {
            let mut cred: libc::ucred = std::mem::zeroed();
            #[allow(clippy::cast_possible_truncation)]
            let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

            let result = libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
                &mut len,
            );

            if result < 0 {
                return Err(TransportError::AuthenticationFailed(
                    "Failed to get peer credentials".to_string(),
                ));
            }
            cred
        };

        let my_uid = unsafe { libc::getuid() };

        if cred.uid != my_uid {
            tracing::warn!(
                peer_uid = cred.uid,
                my_uid = my_uid,
                "Rejecting connection from different user"
            );
            return Err(TransportError::AuthenticationFailed(format!(
                "Peer UID {} does not match server UID {my_uid}",
                cred.uid
            )));
        }

        tracing::debug!(peer_uid = cred.uid, peer_pid = cred.pid, "Peer validated");
        Ok(Some(cred.pid))
    }

    /// Validate peer credentials (non-Linux fallback)
    #[cfg(not(target_os = "linux"))]
    #[allow(clippy::unnecessary_wraps)]
    fn validate_peer(_stream: &UnixStream) -> Result<Option<i32>, TransportError> {
        // SO_PEERCRED is Linux-specific; rely on the 0600 socket mode
        tracing::debug!("Peer validation skipped (non-Linux platform)");
        Ok(None)
    }
}

impl Drop for UnixSocketServer {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if self.listener.is_some() && self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).ok();
        }
    }
}

impl std::fmt::Debug for UnixSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketServer")
            .field("socket_path", &self.socket_path)
            .field("listening", &self.listener.is_some())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

//! Session Providers
//!
//! A transport that accepts display connections needs to know what each
//! new session publishes. A [`SessionProvider`] supplies that payload when
//! a session opens and is told when it closes.

use crate::payload::SessionPayload;
use crate::registry::SessionId;

/// Supplies payloads for sessions created by a transport
pub trait SessionProvider: Send + Sync + 'static {
    /// Payload for a newly opened session
    ///
    /// `None` leaves the session unregistered; its display sees an empty
    /// manifest and every call reports no return.
    fn open(&self, session_id: SessionId) -> Option<SessionPayload>;

    /// Called after the session's payload has been dropped
    fn close(&self, _session_id: SessionId) {}
}

impl<F> SessionProvider for F
where
    F: Fn(SessionId) -> Option<SessionPayload> + Send + Sync + 'static,
{
    fn open(&self, session_id: SessionId) -> Option<SessionPayload> {
        self(session_id)
    }
}

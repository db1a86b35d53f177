//! Session Registry - Per-Session Data and Operations
//!
//! Controller-side store of everything each display session may see.
//! Every session has one entry holding two disjoint maps:
//!
//! - **data**: plain values published verbatim in the manifest
//! - **callables**: operations bound to the session, published by name
//!
//! # Architecture
//!
//! ```text
//!                        SessionRegistry
//!                 ┌───────────────────────────────────┐
//!                 │ HashMap<SessionId, SessionEntry>  │
//!                 │   - wrapped in Arc<RwLock<>>      │
//!                 └─────────────────┬─────────────────┘
//!                                   │
//!            ┌──────────────────────┼──────────────────────┐
//!            │                      │                      │
//!     ┌──────▼──────┐        ┌──────▼──────┐        ┌──────▼──────┐
//!     │  session-1  │        │  session-2  │        │  session-3  │
//!     │ data │ fns  │        │ data │ fns  │        │ data │ fns  │
//!     └─────────────┘        └─────────────┘        └─────────────┘
//! ```
//!
//! # Thread Safety
//!
//! Both maps of a session live in the same entry behind one lock, so a
//! register or unregister is observed by concurrent lookups either fully
//! or not at all.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::classify::{partition, validate_payload, PayloadError};
use crate::payload::{BoundOperation, SessionPayload};
use crate::value::Value;

/// Identifier for one display session
///
/// Assigned by the controller side when the display context's channel is
/// established. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Wrap a raw value, for hosts that assign their own identifiers
    #[must_use]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Everything registered for one session
#[derive(Debug, Default)]
struct SessionEntry {
    data: BTreeMap<String, Value>,
    callables: BTreeMap<String, BoundOperation>,
}

/// Registry of per-session payloads
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's payload
    ///
    /// Validates the payload, splits it into data and callables and binds
    /// every callable to `id`. Replaces any previous entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if a data entry has an unsupported shape.
    /// Nothing is registered in that case and a previous entry is kept.
    pub fn register(&self, id: SessionId, payload: SessionPayload) -> Result<(), PayloadError> {
        validate_payload(&payload)?;

        let parts = partition(payload);
        let entry = SessionEntry {
            data: parts.data,
            callables: parts
                .callables
                .into_iter()
                .map(|(name, op)| {
                    let bound = op.bind(id, &name);
                    (name, bound)
                })
                .collect(),
        };

        let data_count = entry.data.len();
        let callable_count = entry.callables.len();
        let replaced = self.inner.write().insert(id, entry).is_some();

        tracing::info!(
            session_id = %id,
            data_entries = data_count,
            operations = callable_count,
            replaced,
            "Session registered"
        );
        Ok(())
    }

    /// Remove a session's data and operations
    ///
    /// Unknown sessions are ignored.
    pub fn unregister(&self, id: SessionId) {
        if self.inner.write().remove(&id).is_some() {
            tracing::info!(session_id = %id, "Session unregistered");
        } else {
            tracing::debug!(session_id = %id, "Unregister for unknown session ignored");
        }
    }

    /// Data entries of a session; empty if the session is unknown
    #[must_use]
    pub fn data_of(&self, id: SessionId) -> BTreeMap<String, Value> {
        self.inner
            .read()
            .get(&id)
            .map(|entry| entry.data.clone())
            .unwrap_or_default()
    }

    /// Look up a bound operation by session and name
    #[must_use]
    pub fn callable_of(&self, id: SessionId, name: &str) -> Option<BoundOperation> {
        self.inner
            .read()
            .get(&id)
            .and_then(|entry| entry.callables.get(name).cloned())
    }

    /// Names of a session's operations, in key order
    #[must_use]
    pub fn operation_names(&self, id: SessionId) -> Vec<String> {
        self.inner
            .read()
            .get(&id)
            .map(|entry| entry.callables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Data and operation names of a session, read under one lock
    pub(crate) fn snapshot(&self, id: SessionId) -> (BTreeMap<String, Value>, Vec<String>) {
        let inner = self.inner.read();
        inner.get(&id).map_or_else(Default::default, |entry| {
            (
                entry.data.clone(),
                entry.callables.keys().cloned().collect(),
            )
        })
    }

    /// Check if a session is registered
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.inner.read().contains_key(&id)
    }

    /// Number of registered sessions
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// IDs of all registered sessions
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.read().keys().copied().collect()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.count())
            .finish()
    }
}

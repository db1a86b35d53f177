//! Demo Session Provider
//!
//! Gives every display that connects a small payload so the daemon can be
//! exercised end to end with `bridge-display`:
//!
//! | Key       | Kind      | Notes                                      |
//! |-----------|-----------|--------------------------------------------|
//! | `session` | data      | session id as text                         |
//! | `title`   | data      | display title                              |
//! | `window`  | data      | `{ width, height }`                        |
//! | `tags`    | data      | array of strings                           |
//! | `greet`   | operation | `greet(name)` → `"Hi <name>"`              |
//! | `add`     | operation | `add(a, b)` → `a + b`                      |
//! | `counter` | operation | increments a per-session counter           |
//! | `stats`   | operation | async; open sessions and operation calls   |
//!
//! Every operation call, `stats` included, counts towards `calls`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use bridge_core::{Operation, OperationError, SessionId, SessionPayload, SessionProvider, Value};

/// Per-session state captured by the session's operations
#[derive(Debug, Default)]
struct DemoSession {
    counter: AtomicU64,
}

/// Provider handing the demo payload to every new session
#[derive(Debug, Default)]
pub struct DemoProvider {
    sessions: Arc<DashMap<SessionId, Arc<DemoSession>>>,
    calls: Arc<AtomicU64>,
}

impl DemoProvider {
    /// Create a provider with no open sessions
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn payload(&self, session_id: SessionId, state: Arc<DemoSession>) -> SessionPayload {
        let calls = Arc::clone(&self.calls);
        let greet_calls = Arc::clone(&self.calls);
        let counter_calls = Arc::clone(&self.calls);
        let stats_sessions = Arc::clone(&self.sessions);
        let stats_calls = Arc::clone(&self.calls);

        SessionPayload::new()
            .with_data("session", session_id.to_string())
            .with_data("title", format!("Display {}", session_id.as_u64()))
            .with_data(
                "window",
                Value::object([("width", 1280), ("height", 720)]),
            )
            .with_data("tags", vec!["demo", "bridge"])
            .with_operation(
                "greet",
                Operation::sync(move |_, args| {
                    greet_calls.fetch_add(1, Ordering::Relaxed);
                    let name = args.first().and_then(JsonValue::as_str).unwrap_or("stranger");
                    Ok(Value::from(format!("Hi {name}")))
                }),
            )
            .with_operation(
                "add",
                Operation::sync(move |_, args| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    let operand = |i: usize| {
                        args.get(i).and_then(JsonValue::as_f64).ok_or_else(|| {
                            OperationError::InvalidArguments(format!("argument {i} must be a number"))
                        })
                    };
                    Ok(Value::from(operand(0)? + operand(1)?))
                }),
            )
            .with_operation(
                "counter",
                Operation::method(state, move |state, ctx, _| {
                    counter_calls.fetch_add(1, Ordering::Relaxed);
                    async move {
                        let value = state.counter.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(session_id = %ctx.session_id, value, "Counter bumped");
                        Ok(Value::from(value))
                    }
                }),
            )
            .with_operation(
                "stats",
                Operation::from_async(move |_, _| {
                    stats_calls.fetch_add(1, Ordering::Relaxed);
                    let sessions = Arc::clone(&stats_sessions);
                    let calls = Arc::clone(&stats_calls);
                    async move {
                        tokio::task::yield_now().await;
                        Ok(Value::object([
                            ("open_sessions", Value::from(sessions.len() as u64)),
                            ("calls", Value::from(calls.load(Ordering::Relaxed))),
                        ]))
                    }
                }),
            )
    }
}

impl SessionProvider for DemoProvider {
    fn open(&self, session_id: SessionId) -> Option<SessionPayload> {
        let state = Arc::new(DemoSession::default());
        self.sessions.insert(session_id, Arc::clone(&state));
        info!(session_id = %session_id, open = self.sessions.len(), "Demo session opened");
        Some(self.payload(session_id, state))
    }

    fn close(&self, session_id: SessionId) {
        if let Some((_, state)) = self.sessions.remove(&session_id) {
            info!(
                session_id = %session_id,
                counter = state.counter.load(Ordering::SeqCst),
                "Demo session closed"
            );
        }
    }
}

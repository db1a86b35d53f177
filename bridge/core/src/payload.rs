//! Session Payloads
//!
//! What a session contributes to the bridge: a set of keyed entries, each of
//! which is either plain data or a callable operation.
//!
//! Callables never cross the channel. Only their names are published in the
//! manifest, and the display side invokes them by name.
//!
//! # Example
//!
//! ```ignore
//! use bridge_core::{Operation, SessionPayload, Value};
//!
//! let payload = SessionPayload::new()
//!     .with_data("count", 5)
//!     .with_operation(
//!         "greet",
//!         Operation::sync(|_, args| {
//!             let name = args.first().and_then(|v| v.as_str()).unwrap_or("stranger");
//!             Ok(Value::from(format!("Hi {name}")))
//!         }),
//!     );
//! ```

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::registry::SessionId;
use crate::value::Value;

/// Result of running an operation
pub type OperationResult = Result<Value, OperationError>;

/// Failure reported by an operation
///
/// Operation failures are logged and reported on the error event channel.
/// The display side only ever sees "no return value".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The arguments did not match what the operation expects
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The operation ran and failed
    #[error("operation failed: {0}")]
    Failed(String),
}

/// Context passed to every invocation
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Session the operation was registered under
    pub session_id: SessionId,
    /// Name the operation was invoked by
    pub operation: Arc<str>,
}

type OperationFn =
    dyn Fn(CallContext, Vec<JsonValue>) -> BoxFuture<'static, OperationResult> + Send + Sync;

/// A callable payload entry
///
/// Operations take positional JSON arguments and may complete immediately
/// or asynchronously. Cloning is cheap.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationFn>,
}

impl Operation {
    /// Wrap a synchronous function
    ///
    /// The function runs when the returned future is first polled, not when
    /// the invocation is created.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(CallContext, Vec<JsonValue>) -> OperationResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            inner: Arc::new(move |ctx, args| {
                let f = Arc::clone(&f);
                async move { f(ctx, args) }.boxed()
            }),
        }
    }

    /// Wrap an asynchronous function
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(CallContext, Vec<JsonValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |ctx, args| f(ctx, args).boxed()),
        }
    }

    /// Wrap a function that needs an explicit receiver
    ///
    /// The receiver is captured now and handed to every invocation, so the
    /// operation always acts on the resource that owns it.
    pub fn method<R, F, Fut>(receiver: Arc<R>, f: F) -> Self
    where
        R: Send + Sync + 'static,
        F: Fn(Arc<R>, CallContext, Vec<JsonValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        Self::from_async(move |ctx, args| f(Arc::clone(&receiver), ctx, args))
    }

    /// Bind to the session that owns this operation
    pub(crate) fn bind(self, session_id: SessionId, name: &str) -> BoundOperation {
        BoundOperation {
            name: Arc::from(name),
            session_id,
            operation: self,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Operation")
    }
}

/// An operation bound to its owning session
#[derive(Clone, Debug)]
pub struct BoundOperation {
    name: Arc<str>,
    session_id: SessionId,
    operation: Operation,
}

impl BoundOperation {
    /// Name the operation is registered under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session that owns the operation
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Run the operation with positional arguments
    pub fn invoke(&self, args: Vec<JsonValue>) -> BoxFuture<'static, OperationResult> {
        let ctx = CallContext {
            session_id: self.session_id,
            operation: Arc::clone(&self.name),
        };
        (self.operation.inner)(ctx, args)
    }
}

/// One payload entry: data or callable
#[derive(Clone, Debug)]
pub enum PayloadValue {
    /// Serializable data published in the manifest
    Data(Value),
    /// Operation published by name only
    Callable(Operation),
}

impl From<Value> for PayloadValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<Operation> for PayloadValue {
    fn from(op: Operation) -> Self {
        Self::Callable(op)
    }
}

/// Key/value set a session contributes to the bridge
#[derive(Clone, Debug, Default)]
pub struct SessionPayload {
    entries: BTreeMap<String, PayloadValue>,
}

impl SessionPayload {
    /// Create an empty payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data entry
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(key.into(), PayloadValue::Data(value.into()));
        self
    }

    /// Add a callable entry
    #[must_use]
    pub fn with_operation(mut self, key: impl Into<String>, op: Operation) -> Self {
        self.entries.insert(key.into(), PayloadValue::Callable(op));
        self
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, key: impl Into<String>, value: PayloadValue) -> Option<PayloadValue> {
        self.entries.insert(key.into(), value)
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.entries.get(key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, PayloadValue> {
        self.entries.iter()
    }
}

impl IntoIterator for SessionPayload {
    type Item = (String, PayloadValue);
    type IntoIter = btree_map::IntoIter<String, PayloadValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a SessionPayload {
    type Item = (&'a String, &'a PayloadValue);
    type IntoIter = btree_map::Iter<'a, String, PayloadValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, PayloadValue)> for SessionPayload {
    fn from_iter<I: IntoIterator<Item = (K, PayloadValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx_session() -> SessionId {
        SessionId::from_raw(7)
    }

    #[tokio::test]
    async fn test_sync_operation_runs_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::sync(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(1))
        });

        let bound = op.bind(ctx_session(), "tick");
        let pending = bound.invoke(vec![]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(pending.await, Ok(Value::from(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bound_operation_sees_its_session_and_name() {
        let op = Operation::sync(|ctx, _| {
            Ok(Value::from(format!("{}:{}", ctx.session_id, ctx.operation)))
        });

        let bound = op.bind(ctx_session(), "whoami");
        assert_eq!(bound.name(), "whoami");
        assert_eq!(bound.session_id(), ctx_session());
        assert_eq!(
            bound.invoke(vec![]).await,
            Ok(Value::from("session-7:whoami"))
        );
    }

    #[tokio::test]
    async fn test_method_captures_receiver() {
        struct Window {
            title: String,
        }

        let window = Arc::new(Window {
            title: "main".to_string(),
        });
        let op = Operation::method(window, |win, _, args| async move {
            let suffix = args.first().and_then(JsonValue::as_str).unwrap_or_default();
            Ok(Value::from(format!("{}{}", win.title, suffix)))
        });

        let bound = op.bind(ctx_session(), "title");
        assert_eq!(
            bound.invoke(vec![json!("!")]).await,
            Ok(Value::from("main!"))
        );
    }

    #[test]
    fn test_builder_keeps_entries_by_key() {
        let payload = SessionPayload::new()
            .with_data("b", 2)
            .with_operation("a", Operation::sync(|_, _| Ok(Value::Null)))
            .with_data("c", "three");

        assert_eq!(payload.len(), 3);
        assert_eq!(payload.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(matches!(payload.get("a"), Some(PayloadValue::Callable(_))));
        assert!(matches!(payload.get("b"), Some(PayloadValue::Data(_))));
    }
}

//! Bridge Controller
//!
//! The controller side of the bridge. It owns the [`SessionRegistry`] and
//! answers the two requests a display context can make:
//!
//! - **manifest**: the session's data plus the names of its operations
//! - **invoke**: run a named operation with JSON arguments and report its
//!   result
//!
//! # Failure Semantics
//!
//! Nothing here returns an error to the channel. Malformed arguments,
//! unknown sessions or operations, failing or panicking operations and
//! unrepresentable values all degrade to "no return value". Each such case
//! is logged and published on the error event channel (see
//! [`crate::events`]). A display therefore always gets an answer, but cannot
//! tell a failed call from one that legitimately returned nothing.
//!
//! # Return Policy
//!
//! With [`ReturnPolicy::Truthiness`] (the default) a falsy return value
//! (`0`, `false`, `""`, `null`) is reported as "no return". This matches the
//! established wire behaviour. [`ReturnPolicy::Explicit`] reports every
//! non-null value.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast;

use crate::classify::PayloadError;
use crate::events::{BridgeErrorEvent, BridgeErrorKind, ErrorEvents, DEFAULT_EVENT_CAPACITY};
use crate::payload::SessionPayload;
use crate::protocol::{BridgeRequest, BridgeResponse, CallResult, Manifest};
use crate::registry::{SessionId, SessionRegistry};
use crate::value::Value;

/// Body sent when a result cannot be serialized
pub const EMPTY_RESULT_JSON: &str = "{}";

/// How the controller decides whether a call "returned" something
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPolicy {
    /// Only truthy values count as a return
    #[default]
    Truthiness,
    /// Every non-null value counts as a return
    Explicit,
}

impl ReturnPolicy {
    /// Whether `value` is reported as a return under this policy
    #[must_use]
    pub fn has_return(self, value: &Value) -> bool {
        match self {
            Self::Truthiness => value.is_truthy(),
            Self::Explicit => !value.is_null(),
        }
    }
}

impl fmt::Display for ReturnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthiness => f.write_str("truthiness"),
            Self::Explicit => f.write_str("explicit"),
        }
    }
}

impl FromStr for ReturnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "truthiness" | "truthy" => Ok(Self::Truthiness),
            "explicit" => Ok(Self::Explicit),
            other => Err(format!(
                "unknown return policy '{other}' (expected 'truthiness' or 'explicit')"
            )),
        }
    }
}

/// Controller settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Rule for filling `hasReturn`
    pub return_policy: ReturnPolicy,
    /// Deadline for a single operation; `None` waits indefinitely
    pub operation_timeout: Option<Duration>,
    /// Buffered error events per subscriber
    pub error_event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            return_policy: ReturnPolicy::default(),
            operation_timeout: None,
            error_event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Result of resolving one invocation
enum Resolved {
    Result(CallResult),
    Unrepresentable,
}

/// Controller side of the bridge
///
/// Cloning yields another handle to the same registry and event channel,
/// so a clone can be moved into each connection task.
#[derive(Clone, Debug)]
pub struct BridgeController {
    registry: SessionRegistry,
    config: ControllerConfig,
    errors: ErrorEvents,
}

impl Default for BridgeController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl BridgeController {
    /// Create a controller with an empty registry
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_registry(SessionRegistry::new(), config)
    }

    /// Create a controller over an existing registry
    #[must_use]
    pub fn with_registry(registry: SessionRegistry, config: ControllerConfig) -> Self {
        let errors = ErrorEvents::new(config.error_event_capacity);
        Self {
            registry,
            config,
            errors,
        }
    }

    /// The session registry
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Controller settings
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Register a session's payload
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if the payload has an unsupported data entry.
    pub fn register(&self, id: SessionId, payload: SessionPayload) -> Result<(), PayloadError> {
        self.registry.register(id, payload).inspect_err(|e| {
            tracing::error!(session_id = %id, error = %e, "Invalid session payload");
        })
    }

    /// Drop a session's payload; unknown sessions are ignored
    pub fn unregister(&self, id: SessionId) {
        self.registry.unregister(id);
    }

    /// Subscribe to swallowed-error events
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<BridgeErrorEvent> {
        self.errors.subscribe()
    }

    /// Number of swallowed errors so far
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors.total()
    }

    /// Build the manifest for a session
    ///
    /// Unknown sessions get an empty manifest. A data entry with no wire
    /// form is published as `null`.
    #[must_use]
    pub fn manifest(&self, id: SessionId) -> Manifest {
        let (data, functions) = self.registry.snapshot(id);

        let mut wire = Map::new();
        for (key, value) in data {
            let json = value.to_json().unwrap_or_else(|e| {
                self.errors.emit(
                    BridgeErrorEvent::new(BridgeErrorKind::NotRepresentable, e.to_string())
                        .with_session(id)
                        .with_operation(key.clone()),
                );
                JsonValue::Null
            });
            wire.insert(key, json);
        }

        Manifest {
            data: wire,
            functions,
        }
    }

    /// Manifest as JSON text
    #[must_use]
    pub fn manifest_json(&self, id: SessionId) -> String {
        let manifest = self.manifest(id);
        serde_json::to_string(&manifest).unwrap_or_else(|e| {
            self.errors.emit(
                BridgeErrorEvent::new(BridgeErrorKind::NotRepresentable, e.to_string())
                    .with_session(id),
            );
            r#"{"data":{},"functions":[]}"#.to_string()
        })
    }

    /// Invoke an operation and report its result
    pub async fn invoke(&self, id: SessionId, operation: &str, args_json: &str) -> CallResult {
        match self.resolve(id, operation, args_json).await {
            Resolved::Result(result) => result,
            Resolved::Unrepresentable => CallResult::no_return(),
        }
    }

    /// Invoke an operation and report its result as JSON text
    ///
    /// A result that cannot be serialized is sent as `{}`, which the display
    /// side reads as "no return".
    pub async fn invoke_json(&self, id: SessionId, operation: &str, args_json: &str) -> String {
        match self.resolve(id, operation, args_json).await {
            Resolved::Result(result) => serde_json::to_string(&result).unwrap_or_else(|e| {
                self.errors.emit(
                    BridgeErrorEvent::new(BridgeErrorKind::NotRepresentable, e.to_string())
                        .with_session(id)
                        .with_operation(operation),
                );
                EMPTY_RESULT_JSON.to_string()
            }),
            Resolved::Unrepresentable => EMPTY_RESULT_JSON.to_string(),
        }
    }

    /// Answer one request from a session
    pub async fn handle(&self, id: SessionId, request: BridgeRequest) -> BridgeResponse {
        match request {
            BridgeRequest::GetManifest => {
                tracing::debug!(session_id = %id, "Manifest requested");
                BridgeResponse::Manifest {
                    manifest_json: self.manifest_json(id),
                }
            }
            BridgeRequest::Invoke {
                operation,
                args_json,
            } => {
                tracing::debug!(session_id = %id, operation = %operation, "Invoke requested");
                BridgeResponse::InvokeResult {
                    result_json: self.invoke_json(id, &operation, &args_json).await,
                }
            }
        }
    }

    async fn resolve(&self, id: SessionId, operation: &str, args_json: &str) -> Resolved {
        let fail = |kind: BridgeErrorKind, detail: String| {
            self.errors.emit(
                BridgeErrorEvent::new(kind, detail)
                    .with_session(id)
                    .with_operation(operation),
            );
            Resolved::Result(CallResult::no_return())
        };

        let args: Vec<JsonValue> = match serde_json::from_str(args_json) {
            Ok(args) => args,
            Err(e) => {
                return fail(
                    BridgeErrorKind::MalformedArguments,
                    format!("arguments are not a JSON array: {e}"),
                )
            }
        };

        let Some(bound) = self.registry.callable_of(id, operation) else {
            return if self.registry.contains(id) {
                fail(
                    BridgeErrorKind::UnknownOperation,
                    format!("no operation named '{operation}'"),
                )
            } else {
                fail(
                    BridgeErrorKind::UnknownSession,
                    "session has no registered payload".to_string(),
                )
            };
        };

        // Deferred so a panic while building the future is caught too
        let call = AssertUnwindSafe(async move { bound.invoke(args).await }).catch_unwind();
        let outcome = match self.config.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return fail(
                        BridgeErrorKind::Timeout,
                        format!("operation exceeded {}ms", limit.as_millis()),
                    )
                }
            },
            None => call.await,
        };

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return fail(BridgeErrorKind::OperationFailed, e.to_string()),
            Err(_) => {
                return fail(
                    BridgeErrorKind::OperationFailed,
                    "operation panicked".to_string(),
                )
            }
        };

        if !self.config.return_policy.has_return(&value) {
            return Resolved::Result(CallResult::no_return());
        }

        match value.to_json() {
            Ok(json) => Resolved::Result(CallResult::returned(json)),
            Err(e) => {
                self.errors.emit(
                    BridgeErrorEvent::new(BridgeErrorKind::NotRepresentable, e.to_string())
                        .with_session(id)
                        .with_operation(operation),
                );
                Resolved::Unrepresentable
            }
        }
    }
}

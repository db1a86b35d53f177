//! Bridge Client
//!
//! The display side of the bridge. A [`BridgeClient`] asks for its
//! session's manifest as soon as it is created and builds a local view
//! from it: data entries are copied verbatim, and every operation name
//! becomes a [`RemoteStub`] that forwards calls over the channel.
//!
//! # States
//!
//! ```text
//! Pending ──(manifest applied, or failed)──► Ready
//! ```
//!
//! The transition happens once and is permanent. It happens even when the
//! manifest never arrives or cannot be parsed, in which case the client
//! keeps whatever entries it managed to apply. [`BridgeClient::when_ready`]
//! may be awaited any number of times, from any number of tasks.
//!
//! # Calls
//!
//! Calling a stub never fails from the caller's point of view. The plain
//! [`RemoteStub::call`] yields `None` for every kind of miss. Use
//! [`RemoteStub::call_detailed`] to tell a timeout or a broken channel from
//! an operation that returned nothing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::{BridgeErrorEvent, BridgeErrorKind, ErrorEvents, DEFAULT_EVENT_CAPACITY};
use crate::protocol::{BridgeRequest, BridgeResponse, CallResult};
use crate::registry::SessionId;
use crate::signal::ReadySignal;
use crate::transport::{DisplayChannel, TransportError};

/// Default deadline for one remote call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for the manifest request and each remote call; `None`
    /// waits indefinitely
    pub call_timeout: Option<Duration>,
    /// Buffered error events per subscriber
    pub error_event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            error_event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// One entry of the client's data view
#[derive(Clone, Debug)]
pub enum Entry {
    /// A data value copied from the manifest
    Data(JsonValue),
    /// A stub for a controller-side operation
    Remote(RemoteStub),
}

/// The client's data view, keyed like the session payload
pub type BridgeData = BTreeMap<String, Entry>;

/// Detailed result of a remote call
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    /// The operation returned a value
    Returned(JsonValue),
    /// The controller reported no return value
    NoReturn,
    /// No response arrived before the deadline
    TimedOut,
    /// The channel failed before a response arrived
    ChannelFailed(String),
}

impl CallOutcome {
    /// The returned value, if any
    #[must_use]
    pub fn into_value(self) -> Option<JsonValue> {
        match self {
            Self::Returned(value) => Some(value),
            _ => None,
        }
    }
}

/// Why a manifest could not be applied completely
#[derive(Debug, Error)]
enum ManifestError {
    #[error("unexpected response to manifest request")]
    UnexpectedResponse,
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest is not a JSON object")]
    NotAnObject,
    #[error("manifest field '{0}' has the wrong type")]
    FieldType(&'static str),
    #[error("function name at index {0} is not a string")]
    FunctionName(usize),
}

/// State shared by the client and all of its stubs
struct Shared {
    channel: Arc<dyn DisplayChannel>,
    call_timeout: Option<Duration>,
    errors: ErrorEvents,
}

impl Shared {
    fn report(&self, kind: BridgeErrorKind, operation: Option<&str>, detail: impl Into<String>) {
        let mut event = BridgeErrorEvent::new(kind, detail);
        if let Some(session_id) = self.channel.session_id() {
            event = event.with_session(session_id);
        }
        if let Some(operation) = operation {
            event = event.with_operation(operation);
        }
        self.errors.emit(event);
    }

    /// Send a request under the call deadline
    async fn request(&self, request: BridgeRequest) -> Result<BridgeResponse, RequestFailure> {
        let pending = self.channel.request(request);
        let response = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| RequestFailure::TimedOut(limit))?,
            None => pending.await,
        };
        response.map_err(RequestFailure::Channel)
    }
}

enum RequestFailure {
    TimedOut(Duration),
    Channel(TransportError),
}

/// Callable stand-in for a controller-side operation
#[derive(Clone)]
pub struct RemoteStub {
    name: Arc<str>,
    shared: Arc<Shared>,
}

impl RemoteStub {
    /// Operation name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the operation; `None` if it returned nothing or the call failed
    pub async fn call(&self, args: Vec<JsonValue>) -> Option<JsonValue> {
        self.call_detailed(args).await.into_value()
    }

    /// Call the operation and report exactly how it went
    pub async fn call_detailed(&self, args: Vec<JsonValue>) -> CallOutcome {
        let request = BridgeRequest::Invoke {
            operation: self.name.to_string(),
            args_json: JsonValue::Array(args).to_string(),
        };

        let response = match self.shared.request(request).await {
            Ok(response) => response,
            Err(RequestFailure::TimedOut(limit)) => {
                self.shared.report(
                    BridgeErrorKind::Timeout,
                    Some(&self.name),
                    format!("no response within {}ms", limit.as_millis()),
                );
                return CallOutcome::TimedOut;
            }
            Err(RequestFailure::Channel(e)) => {
                self.shared
                    .report(BridgeErrorKind::ChannelFailed, Some(&self.name), e.to_string());
                return CallOutcome::ChannelFailed(e.to_string());
            }
        };

        let BridgeResponse::InvokeResult { result_json } = response else {
            self.shared.report(
                BridgeErrorKind::MalformedResult,
                Some(&self.name),
                "unexpected response to invoke request",
            );
            return CallOutcome::NoReturn;
        };

        match serde_json::from_str::<CallResult>(&result_json) {
            Ok(result) => result
                .into_value()
                .map_or(CallOutcome::NoReturn, CallOutcome::Returned),
            Err(e) => {
                self.shared
                    .report(BridgeErrorKind::MalformedResult, Some(&self.name), e.to_string());
                CallOutcome::NoReturn
            }
        }
    }
}

impl fmt::Debug for RemoteStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteStub").field(&self.name).finish()
    }
}

/// Display-side bridge client
#[derive(Clone)]
pub struct BridgeClient {
    shared: Arc<Shared>,
    data: Arc<RwLock<BridgeData>>,
    ready: ReadySignal,
}

impl BridgeClient {
    /// Create a client and request its manifest
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(channel: Arc<dyn DisplayChannel>, config: ClientConfig) -> Self {
        let client = Self {
            shared: Arc::new(Shared {
                channel,
                call_timeout: config.call_timeout,
                errors: ErrorEvents::new(config.error_event_capacity),
            }),
            data: Arc::new(RwLock::new(BridgeData::new())),
            ready: ReadySignal::new(),
        };

        let loader = client.clone();
        tokio::spawn(async move { loader.load_manifest().await });

        client
    }

    /// Wait until the manifest has been applied (or given up on)
    pub async fn when_ready(&self) {
        self.ready.wait().await;
    }

    /// Whether the client is Ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    /// Session this client's channel is bound to, if known
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.channel.session_id()
    }

    /// Snapshot of the data view
    #[must_use]
    pub fn data(&self) -> BridgeData {
        self.data.read().clone()
    }

    /// One entry of the data view
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.data.read().get(key).cloned()
    }

    /// A data value; `None` for stubs and missing keys
    #[must_use]
    pub fn value(&self, key: &str) -> Option<JsonValue> {
        match self.data.read().get(key) {
            Some(Entry::Data(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The stub for an operation; `None` for data and missing keys
    #[must_use]
    pub fn stub(&self, name: &str) -> Option<RemoteStub> {
        match self.data.read().get(name) {
            Some(Entry::Remote(stub)) => Some(stub.clone()),
            _ => None,
        }
    }

    /// Call an operation by name
    ///
    /// Names that are not in the manifest yield `None` without a request.
    pub async fn call(&self, name: &str, args: Vec<JsonValue>) -> Option<JsonValue> {
        let Some(stub) = self.stub(name) else {
            self.shared.report(
                BridgeErrorKind::UnknownOperation,
                Some(name),
                "operation not in manifest",
            );
            return None;
        };
        stub.call(args).await
    }

    /// Subscribe to this client's swallowed-error events
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<BridgeErrorEvent> {
        self.shared.errors.subscribe()
    }

    /// Number of swallowed errors so far
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.shared.errors.total()
    }

    async fn load_manifest(self) {
        match self.shared.request(BridgeRequest::GetManifest).await {
            Ok(response) => {
                if let Err(e) = self.apply_manifest(response) {
                    self.shared
                        .report(BridgeErrorKind::MalformedManifest, None, e.to_string());
                }
            }
            Err(RequestFailure::TimedOut(limit)) => self.shared.report(
                BridgeErrorKind::Timeout,
                None,
                format!("no manifest within {}ms", limit.as_millis()),
            ),
            Err(RequestFailure::Channel(e)) => {
                self.shared
                    .report(BridgeErrorKind::ChannelFailed, None, e.to_string());
            }
        }

        let entries = self.data.read().len();
        if self.ready.mark_ready() {
            tracing::debug!(session_id = ?self.session_id(), entries, "Bridge client ready");
        }
    }

    /// Apply a manifest entry by entry; entries applied before an error stay
    fn apply_manifest(&self, response: BridgeResponse) -> Result<(), ManifestError> {
        let BridgeResponse::Manifest { manifest_json } = response else {
            return Err(ManifestError::UnexpectedResponse);
        };

        let manifest: JsonValue = serde_json::from_str(&manifest_json)?;
        let JsonValue::Object(mut manifest) = manifest else {
            return Err(ManifestError::NotAnObject);
        };

        match manifest.remove("data") {
            Some(JsonValue::Object(data)) => {
                let mut view = self.data.write();
                for (key, value) in data {
                    view.insert(key, Entry::Data(value));
                }
            }
            Some(JsonValue::Null) | None => {}
            Some(_) => return Err(ManifestError::FieldType("data")),
        }

        match manifest.remove("functions") {
            Some(JsonValue::Array(names)) => {
                for (index, name) in names.into_iter().enumerate() {
                    let JsonValue::String(name) = name else {
                        return Err(ManifestError::FunctionName(index));
                    };
                    let stub = RemoteStub {
                        name: Arc::from(name.as_str()),
                        shared: Arc::clone(&self.shared),
                    };
                    self.data.write().insert(name, Entry::Remote(stub));
                }
            }
            Some(JsonValue::Null) | None => {}
            Some(_) => return Err(ManifestError::FieldType("functions")),
        }

        Ok(())
    }
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("session_id", &self.session_id())
            .field("ready", &self.is_ready())
            .field("entries", &self.data.read().len())
            .finish_non_exhaustive()
    }
}

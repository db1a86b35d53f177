//! Bridge Protocol
//!
//! Wire-level types exchanged between a display context and the controller.
//!
//! There are exactly two requests:
//!
//! | Request       | Payload in                         | Payload out (JSON text)              |
//! |---------------|------------------------------------|--------------------------------------|
//! | `GetManifest` | none (session implied by channel)  | `{"data": {...}, "functions": [..]}` |
//! | `Invoke`      | operation name, JSON argument list | `{"hasReturn": bool, "returnData"?}` |
//!
//! Response bodies travel as JSON text so a display can always receive them,
//! even when their contents turn out to be malformed.
//!
//! Socket transports wrap requests and responses in numbered frames so that
//! several invocations can be outstanding on one session at once.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Snapshot of one session's data and operation names
///
/// Never contains operations themselves, only their names. Built fresh for
/// every request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Data entries, verbatim
    pub data: Map<String, JsonValue>,
    /// Names of callable entries
    pub functions: Vec<String>,
}

/// Outcome of one invocation as seen on the wire
///
/// A body with no `hasReturn` field (such as `{}`) reads as "no return".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    /// Whether `return_data` carries the operation's value
    #[serde(default)]
    pub has_return: bool,
    /// The returned value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_data: Option<JsonValue>,
}

impl CallResult {
    /// A result carrying a value
    #[must_use]
    pub fn returned(value: JsonValue) -> Self {
        Self {
            has_return: true,
            return_data: Some(value),
        }
    }

    /// A result with no value
    #[must_use]
    pub fn no_return() -> Self {
        Self::default()
    }

    /// The returned value, if any
    #[must_use]
    pub fn into_value(self) -> Option<JsonValue> {
        if self.has_return {
            self.return_data
        } else {
            None
        }
    }
}

/// Display to controller request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeRequest {
    /// Ask for the session's manifest
    GetManifest,
    /// Invoke a named operation
    Invoke {
        /// Operation name
        operation: String,
        /// JSON text of the positional argument array
        args_json: String,
    },
}

/// Controller to display response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeResponse {
    /// Reply to [`BridgeRequest::GetManifest`]
    Manifest {
        /// JSON text of a [`Manifest`]
        manifest_json: String,
    },
    /// Reply to [`BridgeRequest::Invoke`]
    InvokeResult {
        /// JSON text of a [`CallResult`]
        result_json: String,
    },
}

/// Correlates a response frame with its request on a shared connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// A request on a framed transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation ID chosen by the display side
    pub id: RequestId,
    /// The request
    pub request: BridgeRequest,
}

/// A response on a framed transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// ID of the request being answered
    pub id: RequestId,
    /// The response
    pub response: BridgeResponse,
}

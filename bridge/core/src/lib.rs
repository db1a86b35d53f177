//! Bridge Core - Controller/Display Data Bridge for surface-bridge
//!
//! A controller process owns per-session data and operations. Each display
//! context is bound to one session and sees that session's data plus
//! callable stand-ins for its operations, reached over an asynchronous
//! request/response channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Display contexts                          │
//! │   ┌───────────────────────┐        ┌───────────────────────┐     │
//! │   │ BridgeClient          │        │ BridgeClient          │     │
//! │   │  data: count = 5      │        │  data: title = "..."  │     │
//! │   │  greet(..) → stub     │        │  save(..) → stub      │     │
//! │   └───────────┬───────────┘        └───────────┬───────────┘     │
//! │               │ DisplayChannel                 │                 │
//! │               │ (in-process or Unix socket)    │                 │
//! └───────────────┼────────────────────────────────┼─────────────────┘
//!                 │  GetManifest / Invoke          │
//! ┌───────────────┼────────────────────────────────┼─────────────────┐
//! │               ▼         CONTROLLER             ▼                 │
//! │   ┌───────────────────────────────────────────────────────────┐  │
//! │   │ BridgeController                                          │  │
//! │   │   SessionRegistry: session → { data, bound operations }   │  │
//! │   │   ErrorEvents: swallowed failures, counted and broadcast  │  │
//! │   └───────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`SessionPayload`]: what a session publishes, as [`PayloadValue::Data`]
//!   or [`PayloadValue::Callable`] entries
//! - [`SessionRegistry`]: validated, partitioned payloads per session
//! - [`BridgeController`]: answers manifest and invoke requests
//! - [`BridgeClient`]: display-side view with [`RemoteStub`]s
//! - [`ReadySignal`]: broadcast-once readiness latch
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_core::{
//!     BridgeClient, BridgeController, ClientConfig, InProcessChannel, Operation,
//!     SessionId, SessionPayload, Value,
//! };
//!
//! let controller = BridgeController::default();
//! let session = SessionId::new();
//! controller.register(
//!     session,
//!     SessionPayload::new()
//!         .with_data("count", 5)
//!         .with_operation("greet", Operation::sync(|_, args| {
//!             let name = args.first().and_then(|v| v.as_str()).unwrap_or_default();
//!             Ok(Value::from(format!("Hi {name}")))
//!         })),
//! )?;
//!
//! let channel = InProcessChannel::bind(controller, session);
//! let client = BridgeClient::new(Arc::new(channel), ClientConfig::default());
//! client.when_ready().await;
//!
//! let greeting = client.call("greet", vec!["World".into()]).await;
//! assert_eq!(greeting, Some("Hi World".into()));
//! ```
//!
//! # Module Overview
//!
//! - [`value`]: controller-side values, including unrepresentable symbols
//! - [`payload`]: session payloads and operations
//! - [`classify`]: value classification and payload validation
//! - [`registry`]: the session registry
//! - [`controller`]: manifest and invoke handling
//! - [`client`]: display-side client and remote stubs
//! - [`signal`]: readiness signal
//! - [`events`]: structured error events
//! - [`protocol`]: wire types
//! - [`provider`]: session lifecycle hook used by transports
//! - [`transport`]: in-process and Unix socket channels
//! - [`config`]: TOML, environment and CLI configuration

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod client;
pub mod config;
pub mod controller;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod signal;
pub mod transport;
pub mod value;

// Re-exports for convenience
pub use classify::{classify, partition, validate_payload, PayloadError, ValueKind};
pub use client::{BridgeClient, BridgeData, CallOutcome, ClientConfig, Entry, RemoteStub};
pub use controller::{BridgeController, ControllerConfig, ReturnPolicy};
pub use events::{BridgeErrorEvent, BridgeErrorKind};
pub use payload::{
    BoundOperation, CallContext, Operation, OperationError, PayloadValue, SessionPayload,
};
pub use protocol::{BridgeRequest, BridgeResponse, CallResult, Manifest};
pub use provider::SessionProvider;
pub use registry::{SessionId, SessionRegistry};
pub use signal::ReadySignal;
pub use value::{Symbol, Value, ValueError};

// Transport exports
pub use transport::{DisplayChannel, InProcessChannel, TransportConfig, TransportError};
#[cfg(unix)]
pub use transport::{UnixSocketChannel, UnixSocketServer};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BridgeConfig, BridgeToml,
    ConfigError, ConfigOverrides, ConfigSource,
};

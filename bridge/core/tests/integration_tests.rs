//! Integration tests for the controller/display bridge
//!
//! These tests drive the public API the way a host application would:
//! - Register payloads, connect a display, read data and call operations
//! - In-process and Unix socket channels
//! - Session lifecycle through a `SessionProvider`
//! - TOML configuration feeding the server and client

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::oneshot;

use bridge_core::config::load_config_with_env;
use bridge_core::{
    BridgeClient, BridgeController, BridgeErrorKind, CallOutcome, ClientConfig, ControllerConfig,
    InProcessChannel, Operation, OperationError, ReturnPolicy, SessionId, SessionPayload,
    SessionProvider, UnixSocketChannel, UnixSocketServer, Value,
};

const WAIT: Duration = Duration::from_secs(2);

fn greet() -> Operation {
    Operation::sync(|_, args| {
        let name = args.first().and_then(JsonValue::as_str).unwrap_or_default();
        Ok(Value::from(format!("Hi {name}")))
    })
}

async fn ready(client: &BridgeClient) {
    tokio::time::timeout(WAIT, client.when_ready())
        .await
        .expect("client should become ready");
}

// =============================================================================
// In-Process Bridge
// =============================================================================

/// The canonical scenario: `{count: 5, greet}` seen from the display side.
#[tokio::test]
async fn test_greet_scenario_in_process() {
    let controller = BridgeController::default();
    let session = SessionId::from_raw(1);
    controller
        .register(
            session,
            SessionPayload::new()
                .with_data("count", 5)
                .with_operation("greet", greet()),
        )
        .unwrap();

    let channel = InProcessChannel::bind(controller.clone(), session);
    let client = BridgeClient::new(Arc::new(channel), ClientConfig::default());
    ready(&client).await;

    assert_eq!(client.session_id(), Some(session));
    assert_eq!(client.value("count"), Some(json!(5)));
    assert_eq!(
        client.call("greet", vec![json!("World")]).await,
        Some(json!("Hi World"))
    );
    assert_eq!(controller.error_count(), 0);
}

/// Operations act on the resource captured at registration, not on whoever calls.
#[tokio::test]
async fn test_method_operations_keep_their_receiver() {
    struct Window {
        title: Mutex<String>,
    }

    let controller = BridgeController::default();
    let mut clients = Vec::new();

    for title in ["left", "right"] {
        let window = Arc::new(Window {
            title: Mutex::new(title.to_string()),
        });
        let session = SessionId::new();
        controller
            .register(
                session,
                SessionPayload::new()
                    .with_operation(
                        "title",
                        Operation::method(Arc::clone(&window), |w, _, _| async move {
                            Ok(Value::from(w.title.lock().clone()))
                        }),
                    )
                    .with_operation(
                        "rename",
                        Operation::method(window, |w, ctx, args| async move {
                            let Some(new_title) = args.first().and_then(JsonValue::as_str)
                            else {
                                return Err(OperationError::InvalidArguments(
                                    "expected a title".into(),
                                ));
                            };
                            *w.title.lock() = format!("{new_title} ({})", ctx.session_id);
                            Ok(Value::Null)
                        }),
                    ),
            )
            .unwrap();

        let client = BridgeClient::new(
            Arc::new(InProcessChannel::bind(controller.clone(), session)),
            ClientConfig::default(),
        );
        clients.push((session, client));
    }

    for (_, client) in &clients {
        ready(client).await;
    }

    let (left_session, left) = &clients[0];
    let (_, right) = &clients[1];

    assert_eq!(left.call("rename", vec![json!("main")]).await, None);
    assert_eq!(
        left.call("title", vec![]).await,
        Some(json!(format!("main ({left_session})")))
    );
    assert_eq!(right.call("title", vec![]).await, Some(json!("right")));

    // Bad arguments fail softly and are reported
    assert_eq!(left.call("rename", vec![json!(42)]).await, None);
    assert_eq!(controller.error_count(), 1);
}

#[tokio::test]
async fn test_unregistered_session_sees_empty_bridge() {
    let controller = BridgeController::default();
    let session = SessionId::new();

    let client = BridgeClient::new(
        Arc::new(InProcessChannel::bind(controller, session)),
        ClientConfig::default(),
    );
    ready(&client).await;

    assert!(client.data().is_empty());
}

#[tokio::test]
async fn test_unregister_mid_session_degrades_calls() {
    let controller = BridgeController::default();
    let session = SessionId::new();
    controller
        .register(session, SessionPayload::new().with_operation("greet", greet()))
        .unwrap();

    let client = BridgeClient::new(
        Arc::new(InProcessChannel::bind(controller.clone(), session)),
        ClientConfig::default(),
    );
    ready(&client).await;

    controller.unregister(session);

    let stub = client.stub("greet").expect("stub was built before unregister");
    assert_eq!(
        stub.call_detailed(vec![json!("late")]).await,
        CallOutcome::NoReturn
    );

    let mut errors = controller.subscribe_errors();
    stub.call(vec![]).await;
    assert_eq!(
        errors.recv().await.unwrap().kind,
        BridgeErrorKind::UnknownSession
    );
}

/// Calls on one session are independent round-trips; a slow call does not
/// hold up a fast one.
#[tokio::test]
async fn test_slow_call_does_not_block_fast_call() {
    let controller = BridgeController::default();
    let session = SessionId::new();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));

    controller
        .register(
            session,
            SessionPayload::new()
                .with_operation(
                    "slow",
                    Operation::from_async(move |_, _| {
                        let gate = release_rx.lock().take();
                        async move {
                            if let Some(gate) = gate {
                                let _ = gate.await;
                            }
                            Ok(Value::from("slow"))
                        }
                    }),
                )
                .with_operation("fast", Operation::sync(|_, _| Ok(Value::from("fast")))),
        )
        .unwrap();

    let client = BridgeClient::new(
        Arc::new(InProcessChannel::bind(controller, session)),
        ClientConfig::default(),
    );
    ready(&client).await;

    let slow_client = client.clone();
    let slow = tokio::spawn(async move { slow_client.call("slow", vec![]).await });

    assert_eq!(
        tokio::time::timeout(WAIT, client.call("fast", vec![]))
            .await
            .unwrap(),
        Some(json!("fast"))
    );

    release_tx.send(()).unwrap();
    assert_eq!(slow.await.unwrap(), Some(json!("slow")));
}

#[tokio::test]
async fn test_explicit_policy_end_to_end() {
    let controller = BridgeController::new(ControllerConfig {
        return_policy: ReturnPolicy::Explicit,
        ..ControllerConfig::default()
    });
    let session = SessionId::new();
    controller
        .register(
            session,
            SessionPayload::new()
                .with_operation("zero", Operation::sync(|_, _| Ok(Value::from(0))))
                .with_operation("flag", Operation::sync(|_, _| Ok(Value::from(false)))),
        )
        .unwrap();

    let client = BridgeClient::new(
        Arc::new(InProcessChannel::bind(controller, session)),
        ClientConfig::default(),
    );
    ready(&client).await;

    assert_eq!(client.call("zero", vec![]).await, Some(json!(0)));
    assert_eq!(client.call("flag", vec![]).await, Some(json!(false)));
}

// =============================================================================
// Unix Socket Bridge
// =============================================================================

/// Provider that hands out numbered payloads and records closed sessions
#[derive(Default)]
struct CountingProvider {
    opened: AtomicUsize,
    closed: Mutex<Vec<SessionId>>,
}

impl SessionProvider for CountingProvider {
    fn open(&self, _session_id: SessionId) -> Option<SessionPayload> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Some(
            SessionPayload::new()
                .with_data("display", n as u64)
                .with_data("labels", vec!["a", "b"])
                .with_operation("greet", greet()),
        )
    }

    fn close(&self, session_id: SessionId) {
        self.closed.lock().push(session_id);
    }
}

async fn connect_client(socket_path: &std::path::Path) -> BridgeClient {
    let channel = tokio::time::timeout(WAIT, async {
        loop {
            match UnixSocketChannel::connect(socket_path).await {
                Ok(channel) => break channel,
                Err(_) => tokio::task::yield_now().await,
            }
        }
    })
    .await
    .expect("server should come up");

    let client = BridgeClient::new(Arc::new(channel), ClientConfig::default());
    ready(&client).await;
    client
}

#[tokio::test]
async fn test_greet_scenario_over_unix_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("bridge.sock");

    let controller = BridgeController::default();
    let provider = Arc::new(CountingProvider::default());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut server = UnixSocketServer::new(socket_path.clone());
    server.listen().unwrap();
    let server_controller = controller.clone();
    let server_provider: Arc<dyn SessionProvider> = provider.clone();
    let server_task = tokio::spawn(async move {
        server
            .serve(server_controller, server_provider, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let first = connect_client(&socket_path).await;
    let second = connect_client(&socket_path).await;

    // Each connection is its own session with its own payload
    let mut displays = vec![
        first.value("display").unwrap(),
        second.value("display").unwrap(),
    ];
    displays.sort_by_key(|v| v.as_u64());
    assert_eq!(displays, vec![json!(1), json!(2)]);
    assert_eq!(first.value("labels"), Some(json!(["a", "b"])));

    assert_eq!(
        first.call("greet", vec![json!("World")]).await,
        Some(json!("Hi World"))
    );
    assert_eq!(controller.registry().count(), 2);

    // Dropping a client ends its session
    drop(second);
    tokio::time::timeout(WAIT, async {
        while provider.closed.lock().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("closed session should reach the provider");
    assert_eq!(controller.registry().count(), 1);

    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_server_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("configured.sock");

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[controller]\nreturn_policy = \"explicit\"\n\n[client]\ncall_timeout_ms = 500\n\n[transport]\nsocket_path = \"{}\"\nmax_connections = 2\n",
        socket_path.display()
    )
    .unwrap();

    let config = load_config_with_env(Some(file.path().to_path_buf()), |_| None).unwrap();
    assert_eq!(config.transport.socket_path, PathBuf::from(&socket_path));

    let controller = BridgeController::new(config.controller.clone());
    let mut server = UnixSocketServer::with_config(&config.transport);
    server.listen().unwrap();

    let provider: Arc<dyn SessionProvider> = Arc::new(|_id: SessionId| {
        Some(SessionPayload::new().with_operation("none", Operation::sync(|_, _| Ok(Value::from("")))))
    });

    let channel = UnixSocketChannel::connect(&config.transport.socket_path)
        .await
        .unwrap();
    let session = server.accept(&controller, &provider).await.unwrap();
    assert!(controller.registry().contains(session));

    let client = BridgeClient::new(Arc::new(channel), config.client.clone());
    ready(&client).await;

    // Explicit policy reports the empty string instead of collapsing it
    assert_eq!(client.call("none", vec![]).await, Some(json!("")));
}

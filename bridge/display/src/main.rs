//! Bridge Display - Display Side of the Surface Bridge
//!
//! Connects to a running `bridge-daemon`, waits for the session manifest and
//! prints the resulting data view as JSON. With `--call` it also invokes one
//! remote operation and prints its outcome.
//!
//! # Usage
//!
//! ```bash
//! # Show what the session publishes
//! bridge-display
//!
//! # Call an operation
//! bridge-display --call greet --args '["World"]'
//!
//! # Custom socket and a short deadline
//! bridge-display --socket /tmp/bridge.sock --call stats --timeout-ms 500
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

use bridge_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use bridge_core::{BridgeClient, BridgeData, CallOutcome, Entry, UnixSocketChannel};

/// Bridge Display - reads a session's data and calls its operations
#[derive(Parser, Debug)]
#[command(name = "bridge-display")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unix socket path of the daemon
    #[arg(short = 's', long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "BRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Operation to call after the manifest is loaded
    #[arg(long, value_name = "NAME")]
    call: Option<String>,

    /// Arguments for `--call`, as a JSON array
    #[arg(long, value_name = "JSON", requires = "call")]
    args: Option<String>,

    /// Deadline for the manifest and the call in milliseconds (0 = none)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "BRIDGE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging on stderr so stdout stays machine-readable
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("bridge_display={level},bridge_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn parse_call_args(raw: &str) -> Result<Vec<JsonValue>> {
    match serde_json::from_str(raw).context("--args is not valid JSON")? {
        JsonValue::Array(items) => Ok(items),
        other => bail!("--args must be a JSON array, got {other}"),
    }
}

/// Render the data view: data entries as their values, operations as markers
fn render_view(data: &BridgeData) -> JsonValue {
    let mut values = Map::new();
    let mut functions = Vec::new();

    for (key, entry) in data {
        match entry {
            Entry::Data(value) => {
                values.insert(key.clone(), value.clone());
            }
            Entry::Remote(stub) => functions.push(stub.name().to_string()),
        }
    }

    json!({ "data": values, "functions": functions })
}

fn render_outcome(name: &str, outcome: &CallOutcome) -> JsonValue {
    match outcome {
        CallOutcome::Returned(value) => json!({ "call": name, "hasReturn": true, "result": value }),
        CallOutcome::NoReturn => json!({ "call": name, "hasReturn": false }),
        CallOutcome::TimedOut => json!({ "call": name, "hasReturn": false, "error": "timed out" }),
        CallOutcome::ChannelFailed(reason) => {
            json!({ "call": name, "hasReturn": false, "error": reason })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let call_args = parse_call_args(args.args.as_deref().unwrap_or("[]"))?;

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    overrides.socket_path.clone_from(&args.socket);
    overrides.call_timeout_ms = args.timeout_ms;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let socket_path = &config.transport.socket_path;
    debug!(socket_path = %socket_path.display(), "Connecting to bridge daemon");

    let channel = UnixSocketChannel::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;

    let client = BridgeClient::new(Arc::new(channel), config.client.clone());
    client.when_ready().await;
    info!(errors = client.error_count(), "Bridge ready");

    println!("{}", serde_json::to_string_pretty(&render_view(&client.data()))?);

    if let Some(name) = args.call.as_deref() {
        let outcome = match client.stub(name) {
            Some(stub) => stub.call_detailed(call_args).await,
            None => bail!("'{name}' is not an operation of this session"),
        };
        println!("{}", serde_json::to_string_pretty(&render_outcome(name, &outcome))?);
    }

    Ok(())
}

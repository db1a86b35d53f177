//! Bridge Daemon - Controller Side of the Surface Bridge
//!
//! Runs a [`BridgeController`] and serves display sessions over a Unix
//! socket. Every display that connects becomes its own session and gets the
//! demo payload (see [`demo`]).
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! bridge-daemon
//!
//! # Custom socket path
//! bridge-daemon --socket-path /tmp/bridge.sock
//!
//! # With config file and explicit return reporting
//! bridge-daemon --config ./bridge.toml --return-policy explicit
//!
//! # Verbose logging
//! RUST_LOG=debug bridge-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod demo;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use bridge_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use bridge_core::{BridgeController, ReturnPolicy, SessionProvider, UnixSocketServer};

use demo::DemoProvider;

/// Bridge Daemon - serves controller-side sessions to display contexts
#[derive(Parser, Debug)]
#[command(name = "bridge-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unix socket path for display connections
    #[arg(short = 's', long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "BRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// PID file path
    #[arg(long, env = "BRIDGE_PID_FILE", value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// How `hasReturn` is decided: truthiness or explicit
    #[arg(long, value_name = "POLICY")]
    return_policy: Option<ReturnPolicy>,

    /// Deadline for a single operation in milliseconds (0 = none)
    #[arg(long, value_name = "MS")]
    operation_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Get the default PID file path, next to the default socket
fn default_pid_path() -> PathBuf {
    bridge_core::transport::default_socket_path().with_file_name("bridge.pid")
}

/// Write PID file
fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {}", parent.display()))?;
    }

    let pid = std::process::id();
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create PID file: {}", path.display()))?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = %path.display(), "PID file created");
    Ok(())
}

/// Remove PID file
fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = %path.display(), "Failed to remove PID file");
        } else {
            info!(path = %path.display(), "PID file removed");
        }
    }
}

/// Check if another daemon is running by checking PID file
fn check_existing_daemon(pid_path: &Path) -> Result<()> {
    if !pid_path.exists() {
        return Ok(());
    }

    let pid_str = fs::read_to_string(pid_path)
        .with_context(|| format!("Failed to read PID file: {}", pid_path.display()))?;

    let pid: i32 = pid_str
        .trim()
        .parse()
        .with_context(|| "Invalid PID in file")?;

    // Signal 0 only checks that the process exists
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        anyhow::bail!(
            "Another bridge-daemon is already running (PID: {pid}). \
             Stop it first or remove {} if it's stale.",
            pid_path.display()
        );
    }

    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(pid_path)?;
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("bridge_daemon={level},bridge_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves once SIGTERM or SIGINT arrives
async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Bridge Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    overrides.socket_path.clone_from(&args.socket_path);
    overrides.return_policy = args.return_policy;
    overrides.operation_timeout_ms = args.operation_timeout_ms;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        socket_path = %config.transport.socket_path.display(),
        source = %config.source_of("transport.socket_path"),
        return_policy = %config.controller.return_policy,
        "Configuration resolved"
    );

    let pid_path = args.pid_file.unwrap_or_else(default_pid_path);
    check_existing_daemon(&pid_path)?;
    write_pid_file(&pid_path)?;

    let signals = tokio::spawn(shutdown_signal());

    let controller = BridgeController::new(config.controller.clone());
    let provider: Arc<dyn SessionProvider> = Arc::new(DemoProvider::new());
    let mut server = UnixSocketServer::with_config(&config.transport);

    let result = server
        .serve(controller.clone(), provider, async move {
            match signals.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Signal handling failed, shutting down"),
                Err(e) => error!(error = %e, "Signal task failed, shutting down"),
            }
        })
        .await
        .context("Server failed");

    info!("Shutting down...");
    remove_pid_file(&pid_path);

    match result {
        Ok(()) => {
            info!(
                swallowed_errors = controller.error_count(),
                "Bridge daemon stopped cleanly"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("run").join("bridge.pid");

        write_pid_file(&pid_path).unwrap();
        let written = fs::read_to_string(&pid_path).unwrap();
        assert_eq!(written.trim(), std::process::id().to_string());

        // Our own PID is alive, so a second daemon must refuse to start
        assert!(check_existing_daemon(&pid_path).is_err());

        remove_pid_file(&pid_path);
        assert!(!pid_path.exists());
        assert!(check_existing_daemon(&pid_path).is_ok());
    }

    #[test]
    fn test_garbage_pid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let pid_path = temp_dir.path().join("bridge.pid");
        fs::write(&pid_path, "not-a-pid").unwrap();

        assert!(check_existing_daemon(&pid_path).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "bridge-daemon",
            "--socket-path",
            "/tmp/b.sock",
            "--return-policy",
            "explicit",
            "--operation-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(args.socket_path, Some(PathBuf::from("/tmp/b.sock")));
        assert_eq!(args.return_policy, Some(ReturnPolicy::Explicit));
        assert_eq!(args.operation_timeout_ms, Some(250));
        assert_eq!(args.log_level, "info");
    }
}

#![forbid(unsafe_code)]

//! `chunker-host` session host binary.
//!
//! Reads client frames from stdin and writes session frames to stdout, one
//! JSON object per line. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use chunker_host::client::ChannelSink;
use chunker_host::config::collect_java_options;
use chunker_host::registry::SessionRegistry;
use chunker_host::session::SessionContext;
use chunker_host::transport;
use chunker_host::{AppError, HostConfig, Result};

const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chunker-host", about = "Session host for chunker-cli", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Engine executable, or a directory to search when it ends in a
    /// separator.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Extra JVM options for the engine; may be repeated.
    #[arg(long = "java-options", allow_hyphen_values = true)]
    java_options: Vec<String>,

    /// Heap arguments (`-Xmx…`, `-Xms…`) forwarded to the engine.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    jvm_args: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chunker-host bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let outcome = runtime.block_on(run(args));

    // A pending stdin read cannot be cancelled.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    outcome
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => HostConfig::load_from_path(path)?,
        None => HostConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(engine) = args.engine {
        config.engine.executable = Some(engine);
    }

    let java_options = collect_java_options(&args.jvm_args, &args.java_options);
    let launch = config.launch_options(&java_options);
    let staging_root = config.staging_root();
    tokio::fs::create_dir_all(&staging_root)
        .await
        .map_err(|err| AppError::Config(format!("cannot create staging root: {err}")))?;

    info!(
        staging_root = %staging_root.display(),
        install_dir = %launch.install_dir.display(),
        java_options = %launch.java_options,
        "configuration loaded"
    );

    // ── Build the session context ───────────────────────
    let (sink, outbound) = ChannelSink::new();
    let ctx = SessionContext {
        client: Arc::new(sink),
        registry: SessionRegistry::new(),
        launch,
        staging_root,
        limits: config.session_limits(),
    };

    // ── Serve the client channel ────────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    if let Err(err) = transport::serve(tokio::io::stdin(), tokio::io::stdout(), ctx, outbound, ct).await {
        error!(%err, "client transport failed");
        return Err(err);
    }

    info!("chunker-host shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

//! gcr-gateway - Generation callback reconciliation service
//!
//! Accepts generation requests, forwards them to the configured provider and
//! reconciles each one with its asynchronous result. Provider webhooks land
//! on `POST /callback`.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gcr_common::config::{load_toml_config, resolve_config_path, LoggingConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gcr_gateway::reconcile::CorrelationStore;
use gcr_gateway::{build_router, AppState};

const MODULE_NAME: &str = "gcr-gateway";

/// Command-line arguments for gcr-gateway
#[derive(Parser, Debug)]
#[command(name = "gcr-gateway")]
#[command(about = "Generation callback reconciliation gateway")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the TOML `port`)
    #[arg(short, long, env = "GCR_PORT")]
    port: Option<u16>,

    /// Bind address (overrides the TOML `bind_address`)
    #[arg(short, long)]
    bind: Option<String>,

    /// Path to gcr-gateway.toml
    #[arg(short, long, env = "GCR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level comes from the config file, so it is loaded first
    let config_path = resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let toml_config = load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&toml_config.logging)?;

    info!("Starting gcr-gateway (Generation Callback Reconciliation)");
    info!(
        "Version: {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GCR_GIT_HASH"),
        env!("GCR_BUILD_TIMESTAMP"),
        env!("GCR_BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    let store = Arc::new(CorrelationStore::new());
    let service = gcr_gateway::config::build_service(&toml_config, store)
        .context("Failed to build generation service")?;
    info!(
        provider = service.provider_name(),
        poll_interval_s = toml_config.reconciliation.poll_interval_seconds,
        deadline_s = toml_config.reconciliation.deadline_seconds,
        "Generation service initialized"
    );

    let sync_deadline = gcr_common::time::secs_to_duration(toml_config.reconciliation.sync_deadline_seconds);
    let max_deadline = gcr_common::time::secs_to_duration(toml_config.reconciliation.max_timeout_seconds);
    let app = build_router(AppState::new(Arc::new(service), sync_deadline, max_deadline));

    let bind = args.bind.unwrap_or(toml_config.bind_address);
    let port = args.port.unwrap_or(toml_config.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// RUST_LOG wins, then `[logging] level`; output goes to `[logging] file` when set
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("gcr_gateway={0},gcr_common={0},tower_http={0}", logging.level)))
        .unwrap_or_else(|_| EnvFilter::new("gcr_gateway=info,tower_http=info"));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

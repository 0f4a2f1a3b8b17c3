use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;
use turnstile::ratelimit::{spawn_sweeper, RateLimiter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Per-session request rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve HTTP on
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Actions admitted per window
    #[arg(long)]
    limit: Option<u32>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Cap on tracked session keys
    #[arg(long)]
    max_keys: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(limit) = args.limit {
        config.rate_limiting.limit = limit;
    }
    if let Some(secs) = args.window_secs {
        config.rate_limiting.set_window_secs(secs)?;
    }
    if args.max_keys.is_some() {
        config.rate_limiting.max_keys = args.max_keys;
    }
    config.validate()?;

    info!(
        http_addr = %config.server.http_addr,
        limit = config.rate_limiting.limit,
        window_ms = config.rate_limiting.window_ms,
        max_keys = ?config.rate_limiting.max_keys,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let rate_limiter = Arc::new(RateLimiter::with_config(
        config.rate_limiting.limit_config(),
    )?);
    info!("Rate limiter initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        config.rate_limiting.sweep_interval(),
        shutdown_rx,
    );

    let http_server = HttpServer::new(
        config.server.http_addr,
        rate_limiter,
        config.client_key.salt.clone(),
    );

    // Run the server with graceful shutdown on Ctrl+C
    http_server.serve_with_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

//! SyncSong Server - Standalone session server for SyncSong.
//!
//! Hosts the session registry behind a WebSocket endpoint. Members connect,
//! create or join sessions, and the registry keeps their shared queue and
//! now-playing state in step. Sessions live in memory only.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use syncsong_core::{bootstrap_services, start_server};
use tokio::signal;

use crate::config::{parse_origins, ServerConfig};

/// SyncSong Server - shared listening sessions over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "syncsong-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNCSONG_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Comma-separated CORS origins (overrides config file).
    #[arg(long, value_name = "ORIGINS")]
    cors_origins: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("SyncSong Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(origins) = args.cors_origins.as_deref() {
        config.cors_origins = parse_origins(origins);
    }

    log::info!(
        "Configuration: bind_port={}, cors_origins={:?}",
        config.bind_port,
        config.cors_origins
    );

    let services =
        bootstrap_services(&config.to_core_config()).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = services.app_state();
    let server_token = services.cancel_token.clone();
    let server_handle = tokio::spawn(async move {
        let result = start_server(app_state).await;
        if let Err(e) = &result {
            log::error!("Server error: {}", e);
        }
        // Unblocks the wait below if the server stopped on its own.
        server_token.cancel();
        result
    });

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        _ = services.cancel_token.cancelled() => {}
    }

    services.shutdown();

    server_handle
        .await
        .context("Server task panicked")?
        .context("Server failed")?;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

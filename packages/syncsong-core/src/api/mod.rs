//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to the session registry, plus router
//! construction and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::session::SessionRegistry;
use crate::state::Config;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative session store.
    pub registry: Arc<SessionRegistry>,
    /// Tracks open WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancelled to stop accepting connections.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        ws_manager: Arc<WsConnectionManager>,
        config: Arc<RwLock<Config>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            ws_manager,
            config,
            shutdown,
        }
    }
}

/// Binds the configured port (0 = OS-assigned) on all interfaces.
pub async fn bind(state: &AppState) -> Result<TcpListener, ServerError> {
    let port = state.config.read().preferred_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(TcpListener::bind(addr).await?)
}

/// Serves the API on an already-bound listener until `state.shutdown` fires.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

/// Binds the configured port and serves until shutdown.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let listener = bind(&state).await?;
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);
    serve(listener, state).await
}

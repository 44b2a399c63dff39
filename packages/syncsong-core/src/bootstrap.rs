//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! registry, connection manager and API state are instantiated and wired
//! together.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventEmitter, LoggingEventEmitter};
use crate::session::{Registry, SessionRegistry};
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Authoritative session store.
    pub registry: Arc<SessionRegistry>,
    /// Tracks open WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Shared configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state served by [`crate::api::start_server`].
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ws_manager),
            Arc::clone(&self.config),
            self.cancel_token.clone(),
        )
    }

    /// Initiates graceful shutdown: stops accepting connections and
    /// force-closes every open WebSocket.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();

        let closed = self.ws_manager.close_all();
        log::info!("[Bootstrap] Closed {} WebSocket connection(s)", closed);

        let stats = self.registry.stats();
        log::info!(
            "[Bootstrap] Shutdown complete ({} session(s) discarded)",
            stats.sessions
        );
    }
}

/// Bootstraps all services with the default logging event emitter.
///
/// # Errors
///
/// Returns [`SyncError::InvalidInput`] if the configuration is invalid.
pub fn bootstrap_services(config: &Config) -> SyncResult<BootstrappedServices> {
    bootstrap_services_with_emitter(config, Arc::new(LoggingEventEmitter))
}

/// Bootstraps all services with a caller-supplied event emitter.
pub fn bootstrap_services_with_emitter(
    config: &Config,
    emitter: Arc<dyn EventEmitter>,
) -> SyncResult<BootstrappedServices> {
    config
        .validate()
        .map_err(|e| SyncError::InvalidInput(format!("Invalid configuration: {}", e)))?;

    let registry = Arc::new(SessionRegistry::new(Registry::new(
        config.max_display_name_len,
        emitter,
    )));

    log::debug!("[Bootstrap] Services wired (port {})", config.preferred_port);

    Ok(BootstrappedServices {
        registry,
        ws_manager: Arc::new(WsConnectionManager::new()),
        config: Arc::new(RwLock::new(config.clone())),
        cancel_token: CancellationToken::new(),
    })
}

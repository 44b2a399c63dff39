//! WebSocket connection tracking and management.
//!
//! - `WsConnectionManager`: Tracks open member connections
//! - `ConnectionGuard`: RAII guard for automatic cleanup on disconnect

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::model::MemberId;

struct ConnectionState {
    opened_at: Instant,
}

/// Manages all open WebSocket connections, keyed by member id.
///
/// Every connection task holds a child of one global cancellation token, so
/// [`close_all`](Self::close_all) can force-close everything at shutdown.
pub struct WsConnectionManager {
    connections: DashMap<MemberId, ConnectionState>,
    /// Replaced after `close_all()` so later connections are unaffected.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers the connection of `member_id` and returns its cleanup guard.
    pub fn register(self: &Arc<Self>, member_id: &str) -> ConnectionGuard {
        let cancel_token = self.global_cancel.read().child_token();
        self.connections.insert(
            member_id.to_string(),
            ConnectionState {
                opened_at: Instant::now(),
            },
        );
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            member_id,
            self.connections.len()
        );

        ConnectionGuard {
            member_id: member_id.to_string(),
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, member_id: &str) {
        if let Some((_, state)) = self.connections.remove(member_id) {
            log::info!(
                "[WS] Connection unregistered: {} after {:.1}s (remaining: {})",
                member_id,
                state.opened_at.elapsed().as_secs_f64(),
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes all connections. Returns how many were signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a connection when dropped, even if its task panics.
pub struct ConnectionGuard {
    member_id: MemberId,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Cancelled when the manager force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.member_id);
    }
}

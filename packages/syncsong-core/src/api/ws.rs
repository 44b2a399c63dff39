//! WebSocket handler bridging one client connection to the session registry.
//!
//! Inbound text frames are decoded and applied through the registry; the
//! registry answers by queueing [`ServerMessage`]s on this connection's
//! outbox, which the loop below drains onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::model::MemberId;
use crate::protocol::ServerMessage;
use crate::session::SessionRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Member Guard (RAII cleanup)
// ─────────────────────────────────────────────────────────────────────────────

/// Disconnects the member from the registry on drop.
///
/// Host departure must end the session even if the handler exits early.
struct MemberGuard {
    member_id: MemberId,
    registry: Arc<SessionRegistry>,
}

impl MemberGuard {
    fn connect(registry: Arc<SessionRegistry>, outbox: mpsc::Sender<ServerMessage>) -> Self {
        let member_id = registry.connect(outbox);
        Self {
            member_id,
            registry,
        }
    }

    fn id(&self) -> &str {
        &self.member_id
    }
}

impl Drop for MemberGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.member_id);
        log::info!("[WS] Member cleanup: {}", self.member_id);
    }
}

/// Serializes a server message to a WebSocket text frame.
fn to_message(msg: &ServerMessage) -> Option<Message> {
    serde_json::to_string(msg)
        .ok()
        .map(|s| Message::Text(s.into()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler (mounted on `/` and `/ws`).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    log::debug!("[WS] Upgrade request from {}", remote);
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (outbox_capacity, idle_timeout, check_every, ping_every) = {
        let config = state.config.read();
        (
            config.member_outbox_capacity.max(1),
            Duration::from_secs(config.ws_heartbeat_timeout_secs),
            Duration::from_secs(config.ws_heartbeat_check_interval_secs.max(1)),
            Duration::from_secs(config.ws_ping_interval_secs.max(1)),
        )
    };

    let (mut sender, mut receiver) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ServerMessage>(outbox_capacity);

    // Registering queues the `hello` greeting on the outbox.
    let member = MemberGuard::connect(Arc::clone(&state.registry), outbox_tx);
    let conn_guard = state.ws_manager.register(member.id());
    let cancel_token = conn_guard.cancel_token().clone();

    let mut last_activity = Instant::now();

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat_interval = tokio::time::interval(check_every);
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_every, ping_every);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", member.id());
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.registry.handle_text(member.id(), text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        log::debug!("[WS] Ignoring binary frame from {}", member.id());
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Ping/Pong only refresh `last_activity`.
                    _ => {}
                }
            }
            Some(out) = outbox_rx.recv() => {
                if let Some(frame) = to_message(&out) {
                    if sender.send(frame).await.is_err() {
                        log::debug!("[WS] Send failed, closing {}", member.id());
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", member.id());
                    break;
                }
            }
        }
    }

    // MemberGuard and ConnectionGuard Drop impls handle cleanup.
    drop(conn_guard);
    drop(member);
}

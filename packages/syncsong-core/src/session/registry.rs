//! Authoritative in-memory session registry.
//!
//! [`Registry`] owns every live session and every connection. Each handler
//! runs to completion on `&mut self`, so a session is never observed
//! mid-mutation. [`SessionRegistry`] shares one registry between connection
//! tasks behind a mutex; one inbound message is one lock hold.
//!
//! Fan-out is best-effort: each member has a bounded outbox and a full or
//! closed outbox only affects that member.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{Member, Session};
use crate::error::{SyncError, SyncResult};
use crate::events::{ConnectionEvent, EventEmitter, SessionEndReason, SessionEvent};
use crate::model::{AddedBy, IncomingTrack, MemberId, NowPlaying, QueueItem, SessionSnapshot};
use crate::protocol::{ClientMessage, ControlKind, ForwardedControl, ServerMessage};
use crate::protocol_constants::{
    DEFAULT_GUEST_NAME, DEFAULT_HOST_NAME, MAX_DISPLAY_NAME_LEN, SESSION_CODE_MAX_ATTEMPTS,
};
use crate::utils::{
    clean_display_name, normalize_session_code, now_millis, random_id, random_session_code,
};

/// Delivery handle for one connection.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Source of candidate session codes.
pub type CodeGenerator = Box<dyn FnMut() -> String + Send>;

struct Connection {
    outbox: Outbox,
    /// Code of the session this connection has created or joined.
    session: Option<String>,
}

/// Live counters reported by the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub sessions: usize,
    pub connections: usize,
    pub members: usize,
}

/// Sole writer of all sessions.
pub struct Registry {
    sessions: HashMap<String, Session>,
    connections: HashMap<MemberId, Connection>,
    emitter: Arc<dyn EventEmitter>,
    generate_code: CodeGenerator,
    max_display_name_len: usize,
}

impl Registry {
    pub fn new(max_display_name_len: usize, emitter: Arc<dyn EventEmitter>) -> Self {
        Self::with_code_generator(max_display_name_len, emitter, Box::new(random_session_code))
    }

    /// Creates a registry drawing session codes from `generate_code`.
    pub fn with_code_generator(
        max_display_name_len: usize,
        emitter: Arc<dyn EventEmitter>,
        generate_code: CodeGenerator,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            connections: HashMap::new(),
            emitter,
            generate_code,
            max_display_name_len: max_display_name_len.max(1),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a new connection and greets it with its member id.
    pub fn connect(&mut self, outbox: Outbox) -> MemberId {
        let user_id = random_id();
        self.connections.insert(
            user_id.clone(),
            Connection {
                outbox,
                session: None,
            },
        );
        self.send_to(
            &user_id,
            ServerMessage::Hello {
                user_id: user_id.clone(),
            },
        );
        self.emitter.emit_connection(ConnectionEvent::Connected {
            user_id: user_id.clone(),
            timestamp: now_millis(),
        });
        user_id
    }

    /// Drops a connection, leaving its session first.
    pub fn disconnect(&mut self, user_id: &str) {
        self.leave_current(user_id);
        if self.connections.remove(user_id).is_some() {
            self.emitter.emit_connection(ConnectionEvent::Disconnected {
                user_id: user_id.to_string(),
                timestamp: now_millis(),
            });
        }
    }

    /// Applies one inbound message. Rejections go to the sender only.
    pub fn handle(&mut self, user_id: &str, msg: ClientMessage) {
        let kind = msg.kind();
        if let Err(err) = self.dispatch(user_id, msg) {
            log::debug!("[Registry] {} from {} rejected: {}", kind, user_id, err);
            self.reject(user_id, &err);
        }
    }

    /// Sends an `error` envelope to one connection.
    pub fn reject(&self, user_id: &str, err: &SyncError) {
        self.send_to(user_id, ServerMessage::error(err));
    }

    fn dispatch(&mut self, user_id: &str, msg: ClientMessage) -> SyncResult<()> {
        match msg {
            ClientMessage::SessionCreate { payload } => self
                .create_session(user_id, payload.display_name.as_deref())
                .map(drop),
            ClientMessage::SessionJoin { payload } => self
                .join_session(user_id, &payload.session_id, payload.display_name.as_deref())
                .map(drop),
            ClientMessage::SessionLeave { .. } => self.leave_session(user_id),
            ClientMessage::SetGuestControl { payload } => {
                self.set_guest_control(user_id, payload.allow_guest_control)
            }
            ClientMessage::SetPartyMode { payload } => {
                self.set_party_mode(user_id, payload.party_mode)
            }
            ClientMessage::QueueAdd { payload } => {
                self.queue_add(user_id, payload.track).map(drop)
            }
            ClientMessage::QueueRemove { payload } => self.queue_remove(user_id, &payload.queue_id),
            ClientMessage::QueueReorder { payload } => self.queue_reorder(user_id, &payload.order),
            ClientMessage::HostState { payload } => self.host_state(user_id, payload.now_playing),
            ClientMessage::ControlNext { .. } => {
                self.forward_control(user_id, ControlKind::Next, None)
            }
            ClientMessage::ControlPrev { .. } => {
                self.forward_control(user_id, ControlKind::Prev, None)
            }
            ClientMessage::ControlToggle { .. } => {
                self.forward_control(user_id, ControlKind::Toggle, None)
            }
            ClientMessage::ControlSeek { payload } => {
                self.forward_control(user_id, ControlKind::Seek, payload.secs)
            }
            ClientMessage::Heartbeat { .. } => {
                self.send_to(user_id, ServerMessage::HeartbeatAck);
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a session with the caller as host and returns its code.
    ///
    /// A caller already in a session leaves it first.
    pub fn create_session(
        &mut self,
        user_id: &str,
        display_name: Option<&str>,
    ) -> SyncResult<String> {
        self.ensure_connected(user_id)?;
        self.leave_current(user_id);

        let code = self.allocate_code()?;
        let display_name =
            clean_display_name(display_name, DEFAULT_HOST_NAME, self.max_display_name_len);
        let host = Member {
            user_id: user_id.to_string(),
            display_name,
        };
        self.sessions
            .insert(code.clone(), Session::new(code.clone(), host));
        self.set_joined(user_id, Some(code.clone()));

        log::info!("[Registry] Session {} created by {}", code, user_id);
        self.emitter.emit_session(SessionEvent::Created {
            session_id: code.clone(),
            host_user_id: user_id.to_string(),
            timestamp: now_millis(),
        });

        self.send_to(
            user_id,
            ServerMessage::SessionCreated {
                session_id: code.clone(),
            },
        );
        self.broadcast_state(&code);
        Ok(code)
    }

    /// Adds the caller to an existing session as a guest.
    ///
    /// The code is trimmed and uppercased before lookup. Joining the session
    /// the caller is already in only updates its display name.
    pub fn join_session(
        &mut self,
        user_id: &str,
        raw_code: &str,
        display_name: Option<&str>,
    ) -> SyncResult<SessionSnapshot> {
        self.ensure_connected(user_id)?;
        let code = normalize_session_code(raw_code);
        if !self.sessions.contains_key(&code) {
            return Err(SyncError::NotFound("Session not found".into()));
        }

        if self.joined_code(user_id) != Some(code.as_str()) {
            self.leave_current(user_id);
        }

        let display_name =
            clean_display_name(display_name, DEFAULT_GUEST_NAME, self.max_display_name_len);
        let session = self
            .sessions
            .get_mut(&code)
            .ok_or_else(|| SyncError::NotFound("Session not found".into()))?;
        session.upsert_member(Member {
            user_id: user_id.to_string(),
            display_name,
        });
        let member_count = session.members().len();
        self.set_joined(user_id, Some(code.clone()));

        log::info!(
            "[Registry] {} joined session {} ({} members)",
            user_id,
            code,
            member_count
        );
        self.emitter.emit_session(SessionEvent::MemberJoined {
            session_id: code.clone(),
            user_id: user_id.to_string(),
            member_count,
            timestamp: now_millis(),
        });

        self.broadcast_state(&code)
            .ok_or_else(|| SyncError::NotFound("Session not found".into()))
    }

    /// Leaves the caller's session.
    pub fn leave_session(&mut self, user_id: &str) -> SyncResult<()> {
        if self.joined_code(user_id).is_none() {
            return Err(SyncError::NotInSession);
        }
        self.leave_current(user_id);
        Ok(())
    }

    /// Host-only: toggles guest control.
    pub fn set_guest_control(&mut self, user_id: &str, allow: bool) -> SyncResult<()> {
        let session = self.joined_session_mut(user_id)?;
        if !session.is_host(user_id) {
            return Err(SyncError::Forbidden(
                "Only host can change permissions".into(),
            ));
        }
        session.allow_guest_control = allow;
        let code = session.code.clone();

        log::info!("[Registry] Session {} guest control: {}", code, allow);
        self.emitter.emit_session(SessionEvent::GuestControlChanged {
            session_id: code.clone(),
            allow_guest_control: allow,
            timestamp: now_millis(),
        });
        self.broadcast_state(&code);
        Ok(())
    }

    /// Host-only: toggles party mode.
    pub fn set_party_mode(&mut self, user_id: &str, party_mode: bool) -> SyncResult<()> {
        let session = self.joined_session_mut(user_id)?;
        if !session.is_host(user_id) {
            return Err(SyncError::Forbidden(
                "Only host can change party mode".into(),
            ));
        }
        session.party_mode = party_mode;
        let code = session.code.clone();

        self.emitter.emit_session(SessionEvent::PartyModeChanged {
            session_id: code.clone(),
            party_mode,
            timestamp: now_millis(),
        });
        self.broadcast_state(&code);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue & Now Playing
    // ─────────────────────────────────────────────────────────────────────────

    /// Validates and appends a track. Any member may add.
    pub fn queue_add(&mut self, user_id: &str, track: IncomingTrack) -> SyncResult<QueueItem> {
        let session = self.joined_session_mut(user_id)?;
        let track = track.validate()?;

        let added_by = AddedBy {
            user_id: user_id.to_string(),
            display_name: session
                .member(user_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| DEFAULT_GUEST_NAME.to_string()),
        };
        let item = QueueItem {
            queue_id: random_id(),
            track,
            added_by,
            added_at: now_millis(),
        };
        session.queue.push(item.clone());

        let msg = ServerMessage::QueueUpdated {
            queue: session.queue.items().to_vec(),
        };
        let code = session.code.clone();
        log::debug!(
            "[Registry] Session {} queued {} ({} items)",
            code,
            item.queue_id,
            session.queue.len()
        );
        self.broadcast(&code, &msg);
        Ok(item)
    }

    /// Removes an item, clearing now-playing if it pointed at it.
    pub fn queue_remove(&mut self, user_id: &str, queue_id: &str) -> SyncResult<()> {
        let session = self.joined_session_mut(user_id)?;
        if !session.can_control(user_id) {
            return Err(SyncError::Forbidden(
                "Only host can remove (or host must enable guest controls)".into(),
            ));
        }
        session.queue.remove(queue_id);
        session.clear_now_playing_if(queue_id);

        let queue_msg = ServerMessage::QueueUpdated {
            queue: session.queue.items().to_vec(),
        };
        let now_playing_msg = ServerMessage::NowPlayingUpdated {
            now_playing: session.now_playing.clone(),
        };
        let code = session.code.clone();
        self.broadcast(&code, &queue_msg);
        self.broadcast(&code, &now_playing_msg);
        Ok(())
    }

    /// Rebuilds the queue from an id list without dropping items.
    pub fn queue_reorder(&mut self, user_id: &str, order: &[String]) -> SyncResult<()> {
        let session = self.joined_session_mut(user_id)?;
        if !session.can_control(user_id) {
            return Err(SyncError::Forbidden(
                "Only host can reorder (or host must enable guest controls)".into(),
            ));
        }
        if order.is_empty() {
            return Err(SyncError::InvalidInput("Invalid reorder payload".into()));
        }
        session.queue.reorder(order);

        let msg = ServerMessage::QueueUpdated {
            queue: session.queue.items().to_vec(),
        };
        let code = session.code.clone();
        self.broadcast(&code, &msg);
        Ok(())
    }

    /// Replaces now-playing wholesale and broadcasts it to every member,
    /// the publisher included. `None` clears it.
    pub fn host_state(&mut self, user_id: &str, now_playing: Option<NowPlaying>) -> SyncResult<()> {
        let session = self.joined_session_mut(user_id)?;
        if !session.can_control(user_id) {
            return Err(SyncError::Forbidden(
                "Only host can publish playback state (or host must enable guest controls)"
                    .into(),
            ));
        }
        session.now_playing = now_playing.map(|mut np| {
            np.updated_at = now_millis();
            np
        });

        let msg = ServerMessage::NowPlayingUpdated {
            now_playing: session.now_playing.clone(),
        };
        let code = session.code.clone();
        self.broadcast(&code, &msg);
        Ok(())
    }

    /// Forwards a playback control to the host connection only.
    ///
    /// The registry never executes playback itself; session state changes only
    /// once the host publishes a new `host:state`.
    pub fn forward_control(
        &mut self,
        user_id: &str,
        kind: ControlKind,
        secs: Option<f64>,
    ) -> SyncResult<()> {
        let session = self.joined_session(user_id)?;
        if !session.can_control(user_id) {
            return Err(SyncError::Forbidden(
                "Host has not enabled guest controls".into(),
            ));
        }
        if kind == ControlKind::Seek && !secs.is_some_and(|s| s.is_finite() && s >= 0.0) {
            return Err(SyncError::InvalidInput("Invalid seek payload".into()));
        }

        let host_id = session.host_user_id.clone();
        let host_open = session.member(&host_id).is_some()
            && self
                .connections
                .get(&host_id)
                .is_some_and(|c| !c.outbox.is_closed());
        if !host_open {
            return Err(SyncError::HostUnavailable("Host not connected".into()));
        }

        let payload = ForwardedControl {
            secs,
            from_user_id: user_id.to_string(),
            from_name: session
                .member(user_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| DEFAULT_GUEST_NAME.to_string()),
            session_id: session.code.clone(),
        };
        log::debug!(
            "[Registry] Forwarding {} from {} to host {}",
            kind.as_str(),
            user_id,
            host_id
        );
        self.send_to(&host_id, ServerMessage::forwarded(kind, payload));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the snapshot of a session by (user-typed) code.
    pub fn snapshot(&self, raw_code: &str) -> Option<SessionSnapshot> {
        self.sessions
            .get(&normalize_session_code(raw_code))
            .map(Session::snapshot)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.sessions.len(),
            connections: self.connections.len(),
            members: self.sessions.values().map(|s| s.members().len()).sum(),
        }
    }

    /// Code of the session `user_id` is currently in.
    pub fn joined_code(&self, user_id: &str) -> Option<&str> {
        self.connections
            .get(user_id)
            .and_then(|c| c.session.as_deref())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_connected(&self, user_id: &str) -> SyncResult<()> {
        if self.connections.contains_key(user_id) {
            Ok(())
        } else {
            Err(SyncError::Internal(format!("unknown connection {}", user_id)))
        }
    }

    fn joined_session(&self, user_id: &str) -> SyncResult<&Session> {
        let code = self.joined_code(user_id).ok_or(SyncError::NotInSession)?;
        self.sessions.get(code).ok_or(SyncError::NotInSession)
    }

    fn joined_session_mut(&mut self, user_id: &str) -> SyncResult<&mut Session> {
        let code = self
            .connections
            .get(user_id)
            .and_then(|c| c.session.as_deref())
            .ok_or(SyncError::NotInSession)?;
        self.sessions.get_mut(code).ok_or(SyncError::NotInSession)
    }

    fn set_joined(&mut self, user_id: &str, code: Option<String>) {
        if let Some(conn) = self.connections.get_mut(user_id) {
            conn.session = code;
        }
    }

    fn allocate_code(&mut self) -> SyncResult<String> {
        for _ in 0..SESSION_CODE_MAX_ATTEMPTS {
            let code = (self.generate_code)();
            if !self.sessions.contains_key(&code) {
                return Ok(code);
            }
        }
        log::error!(
            "[Registry] No free session code after {} attempts",
            SESSION_CODE_MAX_ATTEMPTS
        );
        Err(SyncError::Internal(
            "could not allocate a session code".into(),
        ))
    }

    /// Removes `user_id` from its session, if any.
    ///
    /// Host departure ends the session for everyone; the last member leaving
    /// deletes it; otherwise the remaining members get a fresh snapshot.
    fn leave_current(&mut self, user_id: &str) {
        let Some(code) = self
            .connections
            .get_mut(user_id)
            .and_then(|c| c.session.take())
        else {
            return;
        };
        let Some(session) = self.sessions.get_mut(&code) else {
            return;
        };

        session.remove_member(user_id);
        let was_host = session.is_host(user_id);
        let remaining: Vec<MemberId> = session
            .members()
            .iter()
            .map(|m| m.user_id.clone())
            .collect();

        if was_host {
            self.sessions.remove(&code);
            let ended = ServerMessage::session_ended();
            for member_id in &remaining {
                self.send_to(member_id, ended.clone());
                self.set_joined(member_id, None);
            }
            log::info!(
                "[Registry] Host {} left, session {} ended ({} members notified)",
                user_id,
                code,
                remaining.len()
            );
            self.emitter.emit_session(SessionEvent::Ended {
                session_id: code,
                reason: SessionEndReason::HostLeft,
                timestamp: now_millis(),
            });
        } else if remaining.is_empty() {
            self.sessions.remove(&code);
            log::info!("[Registry] Session {} empty, removed", code);
            self.emitter.emit_session(SessionEvent::Ended {
                session_id: code,
                reason: SessionEndReason::Empty,
                timestamp: now_millis(),
            });
        } else {
            log::info!("[Registry] {} left session {}", user_id, code);
            self.emitter.emit_session(SessionEvent::MemberLeft {
                session_id: code.clone(),
                user_id: user_id.to_string(),
                member_count: remaining.len(),
                timestamp: now_millis(),
            });
            self.broadcast_state(&code);
        }
    }

    /// Queues `msg` on one connection's outbox. Returns false if it was dropped.
    fn send_to(&self, user_id: &str, msg: ServerMessage) -> bool {
        let Some(conn) = self.connections.get(user_id) else {
            return false;
        };
        match conn.outbox.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("[Registry] Outbox full for {}, message dropped", user_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[Registry] Outbox closed for {}", user_id);
                false
            }
        }
    }

    fn broadcast(&self, code: &str, msg: &ServerMessage) {
        let Some(session) = self.sessions.get(code) else {
            return;
        };
        for member in session.members() {
            self.send_to(&member.user_id, msg.clone());
        }
    }

    fn broadcast_state(&self, code: &str) -> Option<SessionSnapshot> {
        let snapshot = self.sessions.get(code)?.snapshot();
        self.broadcast(code, &ServerMessage::SessionState(snapshot.clone()));
        Some(snapshot)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(
            MAX_DISPLAY_NAME_LEN,
            Arc::new(crate::events::NoopEventEmitter),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe handle shared by all connection tasks.
pub struct SessionRegistry {
    inner: Mutex<Registry>,
}

impl SessionRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Mutex::new(registry),
        }
    }

    pub fn connect(&self, outbox: Outbox) -> MemberId {
        self.inner.lock().connect(outbox)
    }

    pub fn disconnect(&self, user_id: &str) {
        self.inner.lock().disconnect(user_id);
    }

    pub fn handle(&self, user_id: &str, msg: ClientMessage) {
        self.inner.lock().handle(user_id, msg);
    }

    /// Decodes and applies a text frame. Decode failures are reported to the
    /// sender as `error` envelopes.
    pub fn handle_text(&self, user_id: &str, text: &str) {
        match ClientMessage::decode(text) {
            Ok(msg) => self.handle(user_id, msg),
            Err(err) => {
                log::debug!("[Registry] Bad frame from {}: {}", user_id, err);
                self.inner.lock().reject(user_id, &err);
            }
        }
    }

    pub fn snapshot(&self, raw_code: &str) -> Option<SessionSnapshot> {
        self.inner.lock().snapshot(raw_code)
    }

    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::model::TrackSource;
    use crate::protocol::SESSION_ENDED_CODE;
    use serde_json::json;

    type Inbox = mpsc::Receiver<ServerMessage>;

    fn registry_with_codes(codes: &[&str]) -> Registry {
        let mut codes: std::vec::IntoIter<String> = codes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .into_iter();
        Registry::with_code_generator(
            MAX_DISPLAY_NAME_LEN,
            Arc::new(NoopEventEmitter),
            Box::new(move || codes.next().unwrap_or_else(|| "FFFFFF".to_string())),
        )
    }

    fn connect(registry: &mut Registry) -> (MemberId, Inbox) {
        let (tx, rx) = mpsc::channel(64);
        let id = registry.connect(tx);
        (id, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn track(title: &str) -> IncomingTrack {
        serde_json::from_value(json!({
            "title": title,
            "artist": "Y",
            "durationMs": 200000,
            "source": "spotify",
            "sourceId": "t1"
        }))
        .unwrap()
    }

    fn last_error(msgs: &[ServerMessage]) -> Option<(String, String)> {
        msgs.iter().rev().find_map(|m| match m {
            ServerMessage::Error { message, code } => Some((message.clone(), code.clone())),
            _ => None,
        })
    }

    /// Host `A` in session `ABC123` plus guest `B`, inboxes drained.
    fn session_with_guest() -> (Registry, (MemberId, Inbox), (MemberId, Inbox)) {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, mut a_rx) = connect(&mut registry);
        let (b, mut b_rx) = connect(&mut registry);
        registry.create_session(&a, Some("Ann")).unwrap();
        registry.join_session(&b, "ABC123", Some("Bob")).unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);
        (registry, (a, a_rx), (b, b_rx))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection & Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn connect_sends_hello_with_member_id() {
        let mut registry = Registry::default();
        let (id, mut rx) = connect(&mut registry);
        assert_eq!(drain(&mut rx), vec![ServerMessage::Hello { user_id: id }]);
    }

    #[test]
    fn create_replies_created_then_state() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, mut rx) = connect(&mut registry);
        drain(&mut rx);

        registry.handle(
            &a,
            ClientMessage::decode(r#"{"type":"session:create","payload":{}}"#).unwrap(),
        );

        let msgs = drain(&mut rx);
        assert_eq!(
            msgs[0],
            ServerMessage::SessionCreated {
                session_id: "ABC123".into()
            }
        );
        match &msgs[1] {
            ServerMessage::SessionState(s) => {
                assert_eq!(s.host_user_id, a);
                assert!(!s.allow_guest_control);
                assert_eq!(s.members[0].display_name, DEFAULT_HOST_NAME);
            }
            other => panic!("expected session:state, got {:?}", other),
        }
    }

    #[test]
    fn session_code_collision_is_retried() {
        let mut registry = registry_with_codes(&["AAAAAA", "AAAAAA", "BBBBBB"]);
        let (a, _a_rx) = connect(&mut registry);
        let (b, _b_rx) = connect(&mut registry);
        assert_eq!(registry.create_session(&a, None).unwrap(), "AAAAAA");
        assert_eq!(registry.create_session(&b, None).unwrap(), "BBBBBB");
    }

    #[test]
    fn exhausted_code_space_is_internal_error() {
        let mut registry = Registry::with_code_generator(
            MAX_DISPLAY_NAME_LEN,
            Arc::new(NoopEventEmitter),
            Box::new(|| "AAAAAA".to_string()),
        );
        let (a, _a_rx) = connect(&mut registry);
        let (b, _b_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        assert!(matches!(
            registry.create_session(&b, None),
            Err(SyncError::Internal(_))
        ));
    }

    #[test]
    fn join_unknown_code_errors_only_to_requester() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, mut a_rx) = connect(&mut registry);
        let (b, mut b_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        registry.handle(
            &b,
            ClientMessage::decode(r#"{"type":"session:join","payload":{"sessionId":"ZZZZZZ"}}"#)
                .unwrap(),
        );

        assert_eq!(
            last_error(&drain(&mut b_rx)),
            Some(("Session not found".into(), "not_found".into()))
        );
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn join_normalizes_code_and_defaults_name() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, _a_rx) = connect(&mut registry);
        let (b, _b_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        let snapshot = registry.join_session(&b, "  abc123 ", Some("  ")).unwrap();
        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.members[1].display_name, DEFAULT_GUEST_NAME);
    }

    #[test]
    fn display_names_are_truncated() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, _a_rx) = connect(&mut registry);
        registry
            .create_session(&a, Some(&"n".repeat(100)))
            .unwrap();
        let snapshot = registry.snapshot("ABC123").unwrap();
        assert_eq!(
            snapshot.members[0].display_name.chars().count(),
            MAX_DISPLAY_NAME_LEN
        );
    }

    #[test]
    fn host_disconnect_ends_session_for_everyone() {
        let (mut registry, (a, _a_rx), (b, mut b_rx)) = session_with_guest();

        registry.disconnect(&a);

        let msgs = drain(&mut b_rx);
        assert_eq!(
            last_error(&msgs),
            Some((
                "Host disconnected. Session ended.".into(),
                SESSION_ENDED_CODE.into()
            ))
        );
        assert!(registry.snapshot("ABC123").is_none());
        assert_eq!(registry.joined_code(&b), None);

        // No promotion: the guest is no longer in any session.
        assert_eq!(
            registry.queue_add(&b, track("X")).unwrap_err(),
            SyncError::NotInSession
        );
    }

    #[test]
    fn guest_disconnect_rebroadcasts_roster() {
        let (mut registry, (a, mut a_rx), (b, _b_rx)) = session_with_guest();

        registry.disconnect(&b);

        match drain(&mut a_rx).last() {
            Some(ServerMessage::SessionState(s)) => {
                assert_eq!(s.members.len(), 1);
                assert_eq!(s.members[0].user_id, a);
            }
            other => panic!("expected session:state, got {:?}", other),
        }
        assert_eq!(registry.stats().connections, 1);
    }

    #[test]
    fn lone_host_leaving_deletes_session() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, _a_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        registry.leave_session(&a).unwrap();
        assert_eq!(registry.stats().sessions, 0);
        assert_eq!(registry.leave_session(&a), Err(SyncError::NotInSession));
    }

    #[test]
    fn creating_again_leaves_previous_session() {
        let mut registry = registry_with_codes(&["AAAAAA", "BBBBBB"]);
        let (a, _a_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        registry.create_session(&a, None).unwrap();
        assert!(registry.snapshot("AAAAAA").is_none());
        assert_eq!(registry.joined_code(&a), Some("BBBBBB"));
        assert_eq!(registry.stats().sessions, 1);
    }

    #[test]
    fn messages_without_session_are_rejected() {
        let mut registry = Registry::default();
        let (a, mut rx) = connect(&mut registry);
        drain(&mut rx);

        registry.handle(&a, ClientMessage::control(ControlKind::Next, None));

        assert_eq!(
            last_error(&drain(&mut rx)),
            Some(("Not in a valid session".into(), "not_in_session".into()))
        );
    }

    #[test]
    fn heartbeat_is_acknowledged() {
        let mut registry = Registry::default();
        let (a, mut rx) = connect(&mut registry);
        drain(&mut rx);
        registry.handle(&a, ClientMessage::decode(r#"{"type":"heartbeat"}"#).unwrap());
        assert_eq!(drain(&mut rx), vec![ServerMessage::HeartbeatAck]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn only_host_changes_permissions() {
        let (mut registry, (a, mut a_rx), (b, mut b_rx)) = session_with_guest();

        assert_eq!(
            registry.set_guest_control(&b, true),
            Err(SyncError::Forbidden("Only host can change permissions".into()))
        );
        assert_eq!(
            registry.set_party_mode(&b, true),
            Err(SyncError::Forbidden("Only host can change party mode".into()))
        );

        registry.set_guest_control(&a, true).unwrap();
        registry.set_party_mode(&a, true).unwrap();

        for rx in [&mut a_rx, &mut b_rx] {
            match drain(rx).last() {
                Some(ServerMessage::SessionState(s)) => {
                    assert!(s.allow_guest_control);
                    assert!(s.party_mode);
                }
                other => panic!("expected session:state, got {:?}", other),
            }
        }
    }

    #[test]
    fn guest_cannot_mutate_without_guest_control() {
        let (mut registry, (a, _a_rx), (b, _b_rx)) = session_with_guest();
        let item = registry.queue_add(&a, track("X")).unwrap();

        assert!(matches!(
            registry.queue_remove(&b, &item.queue_id),
            Err(SyncError::Forbidden(_))
        ));
        assert!(matches!(
            registry.queue_reorder(&b, &[item.queue_id.clone()]),
            Err(SyncError::Forbidden(_))
        ));
        assert!(matches!(
            registry.host_state(&b, None),
            Err(SyncError::Forbidden(_))
        ));

        registry.set_guest_control(&a, true).unwrap();
        registry.queue_remove(&b, &item.queue_id).unwrap();
        assert_eq!(registry.snapshot("ABC123").unwrap().queue.len(), 0);
    }

    #[test]
    fn any_member_may_add_to_queue() {
        let (mut registry, (_a, mut a_rx), (b, mut b_rx)) = session_with_guest();
        let item = registry.queue_add(&b, track("X")).unwrap();
        assert_eq!(item.added_by.display_name, "Bob");

        for rx in [&mut a_rx, &mut b_rx] {
            match drain(rx).as_slice() {
                [ServerMessage::QueueUpdated { queue }] => assert_eq!(queue.len(), 1),
                other => panic!("expected one queue:updated, got {:?}", other),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn invalid_track_is_rejected_without_broadcast() {
        let (mut registry, (a, mut a_rx), (_b, mut b_rx)) = session_with_guest();
        let bad: IncomingTrack =
            serde_json::from_value(json!({"title": "X", "artist": "Y", "source": "apple"}))
                .unwrap();

        registry.handle(
            &a,
            ClientMessage::QueueAdd {
                payload: crate::protocol::AddTrackRequest { track: bad },
            },
        );

        assert_eq!(
            last_error(&drain(&mut a_rx)),
            Some((
                "Invalid track (missing sourceId)".into(),
                "invalid_input".into()
            ))
        );
        assert!(drain(&mut b_rx).is_empty());
    }

    #[test]
    fn empty_reorder_is_invalid() {
        let (mut registry, (a, _a_rx), _b) = session_with_guest();
        registry.queue_add(&a, track("X")).unwrap();
        assert_eq!(
            registry.queue_reorder(&a, &[]),
            Err(SyncError::InvalidInput("Invalid reorder payload".into()))
        );
    }

    #[test]
    fn partial_reorder_keeps_every_item() {
        let (mut registry, (a, _a_rx), _b) = session_with_guest();
        let ids: Vec<String> = ["1", "2", "3", "4"]
            .iter()
            .map(|t| registry.queue_add(&a, track(t)).unwrap().queue_id)
            .collect();

        registry
            .queue_reorder(&a, &[ids[2].clone(), "unknown".into()])
            .unwrap();

        let queue: Vec<String> = registry
            .snapshot("ABC123")
            .unwrap()
            .queue
            .into_iter()
            .map(|q| q.queue_id)
            .collect();
        assert_eq!(queue, [ids[2].clone(), ids[0].clone(), ids[1].clone(), ids[3].clone()]);
    }

    #[test]
    fn removing_current_item_clears_now_playing() {
        let (mut registry, (a, _a_rx), _b) = session_with_guest();
        let first = registry.queue_add(&a, track("X")).unwrap();
        let second = registry.queue_add(&a, track("Z")).unwrap();
        registry
            .host_state(&a, Some(NowPlaying::for_item(&first, true)))
            .unwrap();

        registry.queue_remove(&a, &second.queue_id).unwrap();
        assert!(registry.snapshot("ABC123").unwrap().now_playing.is_some());

        registry.queue_remove(&a, &first.queue_id).unwrap();
        assert!(registry.snapshot("ABC123").unwrap().now_playing.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control Forwarding
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn disabled_guest_control_rejects_without_forwarding() {
        let (mut registry, (_a, mut a_rx), (b, mut b_rx)) = session_with_guest();

        registry.handle(&b, ClientMessage::control(ControlKind::Next, None));

        assert_eq!(
            last_error(&drain(&mut b_rx)),
            Some((
                "Host has not enabled guest controls".into(),
                "forbidden".into()
            ))
        );
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn guest_control_is_forwarded_to_host_only() {
        let (mut registry, (a, mut a_rx), (b, mut b_rx)) = session_with_guest();
        registry.set_guest_control(&a, true).unwrap();
        let item = registry.queue_add(&a, track("X")).unwrap();
        registry
            .host_state(&a, Some(NowPlaying::for_item(&item, true)))
            .unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);
        let before = registry.snapshot("ABC123").unwrap().now_playing;

        registry.handle(&b, ClientMessage::control(ControlKind::Seek, Some(42.0)));

        let host_msgs = drain(&mut a_rx);
        assert_eq!(
            host_msgs,
            vec![ServerMessage::ControlSeek {
                payload: ForwardedControl {
                    secs: Some(42.0),
                    from_user_id: b.clone(),
                    from_name: "Bob".into(),
                    session_id: "ABC123".into(),
                }
            }]
        );
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(registry.snapshot("ABC123").unwrap().now_playing, before);
    }

    #[test]
    fn seek_without_position_is_invalid() {
        let (mut registry, (a, _a_rx), _b) = session_with_guest();
        assert_eq!(
            registry.forward_control(&a, ControlKind::Seek, None),
            Err(SyncError::InvalidInput("Invalid seek payload".into()))
        );
    }

    #[test]
    fn closed_host_outbox_is_host_unavailable() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, a_rx) = connect(&mut registry);
        let (b, _b_rx) = connect(&mut registry);
        registry.create_session(&a, None).unwrap();
        registry.join_session(&b, "ABC123", None).unwrap();
        registry.set_guest_control(&a, true).unwrap();
        drop(a_rx);

        assert_eq!(
            registry.forward_control(&b, ControlKind::Toggle, None),
            Err(SyncError::HostUnavailable("Host not connected".into()))
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fan-out
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn full_outbox_does_not_block_other_members() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, mut a_rx) = connect(&mut registry);
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = registry.connect(slow_tx);
        registry.create_session(&a, None).unwrap();
        registry.join_session(&slow, "ABC123", None).unwrap();
        drain(&mut a_rx);

        for title in ["1", "2", "3"] {
            registry.queue_add(&a, track(title)).unwrap();
        }

        let updates = drain(&mut a_rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::QueueUpdated { .. }))
            .count();
        assert_eq!(updates, 3);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // End-to-end
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn create_add_join_publish_remove() {
        let mut registry = registry_with_codes(&["ABC123"]);
        let (a, mut a_rx) = connect(&mut registry);
        let (b, mut b_rx) = connect(&mut registry);
        drain(&mut a_rx);
        drain(&mut b_rx);

        let code = registry.create_session(&a, Some("Ann")).unwrap();
        assert_eq!(code, "ABC123");
        let item = registry.queue_add(&a, track("X")).unwrap();
        assert_eq!(item.track.source, TrackSource::Spotify);
        let snapshot = registry.snapshot(&code).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert!(snapshot.now_playing.is_none());
        drain(&mut a_rx);

        registry.join_session(&b, "ABC123", Some("Bob")).unwrap();
        match drain(&mut b_rx).as_slice() {
            [ServerMessage::SessionState(s)] => {
                assert_eq!(s.queue, snapshot.queue);
                assert_eq!(s.host_user_id, a);
            }
            other => panic!("expected session:state, got {:?}", other),
        }
        drain(&mut a_rx);

        let published = NowPlaying {
            queue_id: Some(item.queue_id.clone()),
            track: None,
            is_playing: true,
            playhead_ms: 0,
            updated_at: 0,
        };
        registry.host_state(&a, Some(published.clone())).unwrap();
        for rx in [&mut a_rx, &mut b_rx] {
            match drain(rx).as_slice() {
                [ServerMessage::NowPlayingUpdated {
                    now_playing: Some(np),
                }] => {
                    assert_eq!(np.queue_id, published.queue_id);
                    assert!(np.is_playing);
                    assert_eq!(np.playhead_ms, 0);
                    assert!(np.updated_at > 0);
                }
                other => panic!("expected nowPlaying:updated, got {:?}", other),
            }
        }

        registry.queue_remove(&a, &item.queue_id).unwrap();
        for rx in [&mut a_rx, &mut b_rx] {
            assert_eq!(
                drain(rx),
                vec![
                    ServerMessage::QueueUpdated { queue: vec![] },
                    ServerMessage::NowPlayingUpdated { now_playing: None },
                ]
            );
        }
    }

    #[test]
    fn shared_handle_reports_decode_errors() {
        let shared = SessionRegistry::new(Registry::default());
        let (tx, mut rx) = mpsc::channel(8);
        let id = shared.connect(tx);
        drain(&mut rx);

        shared.handle_text(&id, "{");

        assert_eq!(
            last_error(&drain(&mut rx)),
            Some(("Invalid JSON".into(), "invalid_input".into()))
        );
    }
}

//! Client-side mirror of the joined session.

use crate::model::{MemberId, MemberInfo, NowPlaying, QueueItem};
use crate::protocol::{ControlKind, ForwardedControl, ServerMessage, SESSION_ENDED_CODE};

/// What a server message changed, so the controller knows what to redo.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    Nothing,
    /// Full snapshot replaced (roster, flags, queue and now-playing).
    Session,
    Queue,
    NowPlaying,
    /// The host left; the session is gone.
    Ended(String),
    /// The registry rejected one of our requests.
    Rejected { code: String, message: String },
    /// A member asked the host to execute a control.
    Control(ControlKind, ForwardedControl),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub user_id: Option<MemberId>,
    pub session_id: Option<String>,
    pub host_user_id: Option<MemberId>,
    pub allow_guest_control: bool,
    pub party_mode: bool,
    pub members: Vec<MemberInfo>,
    pub queue: Vec<QueueItem>,
    pub now_playing: Option<NowPlaying>,
}

impl SessionView {
    pub fn in_session(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn is_host(&self) -> bool {
        self.in_session() && self.user_id.is_some() && self.user_id == self.host_user_id
    }

    /// Mirrors the registry's permission rule.
    pub fn can_control(&self) -> bool {
        self.is_host() || (self.in_session() && self.allow_guest_control)
    }

    pub fn queue_item(&self, queue_id: &str) -> Option<&QueueItem> {
        self.queue.iter().find(|item| item.queue_id == queue_id)
    }

    /// Drops all session state, keeping the connection identity.
    pub fn clear_session(&mut self) {
        *self = Self {
            user_id: self.user_id.take(),
            ..Self::default()
        };
    }

    pub fn apply(&mut self, message: &ServerMessage) -> ViewChange {
        match message {
            ServerMessage::Hello { user_id } => {
                self.user_id = Some(user_id.clone());
                ViewChange::Nothing
            }
            ServerMessage::SessionCreated { session_id } => {
                self.session_id = Some(session_id.clone());
                self.host_user_id = self.user_id.clone();
                ViewChange::Nothing
            }
            ServerMessage::SessionState(snapshot) => {
                self.session_id = Some(snapshot.session_id.clone());
                self.host_user_id = Some(snapshot.host_user_id.clone());
                self.allow_guest_control = snapshot.allow_guest_control;
                self.party_mode = snapshot.party_mode;
                self.members = snapshot.members.clone();
                self.queue = snapshot.queue.clone();
                self.now_playing = snapshot.now_playing.clone();
                ViewChange::Session
            }
            ServerMessage::QueueUpdated { queue } => {
                self.queue = queue.clone();
                ViewChange::Queue
            }
            ServerMessage::NowPlayingUpdated { now_playing } => {
                self.now_playing = now_playing.clone();
                ViewChange::NowPlaying
            }
            ServerMessage::Error { message, code } if code == SESSION_ENDED_CODE => {
                self.clear_session();
                ViewChange::Ended(message.clone())
            }
            ServerMessage::Error { message, code } => ViewChange::Rejected {
                code: code.clone(),
                message: message.clone(),
            },
            ServerMessage::HeartbeatAck => ViewChange::Nothing,
            forwarded => match forwarded.as_forwarded() {
                Some((kind, payload)) => ViewChange::Control(kind, payload.clone()),
                None => ViewChange::Nothing,
            },
        }
    }
}

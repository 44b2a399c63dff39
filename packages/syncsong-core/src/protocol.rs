//! Transport envelopes exchanged between clients and the session registry.
//!
//! Every frame is a single JSON object with a `type` tag. Client requests put
//! their arguments under `payload`; server messages carry their fields at the
//! top level, except forwarded controls which keep the requester's payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, SyncError, SyncResult};
use crate::model::{IncomingTrack, MemberId, NowPlaying, QueueId, QueueItem, SessionSnapshot};

/// Error code carried by the terminal notice sent when the host leaves.
pub const SESSION_ENDED_CODE: &str = "session_ended";

/// Message shown to members when the host connection closes.
pub const SESSION_ENDED_MESSAGE: &str = "Host disconnected. Session ended.";

/// Every `type` tag a client may send.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "session:create",
    "session:join",
    "session:leave",
    "session:setGuestControl",
    "session:setPartyMode",
    "queue:add",
    "queue:remove",
    "queue:reorder",
    "host:state",
    "control:next",
    "control:prev",
    "control:toggle",
    "control:seek",
    "heartbeat",
];

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinSessionRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestControlRequest {
    pub allow_guest_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartyModeRequest {
    pub party_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddTrackRequest {
    pub track: IncomingTrack,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveTrackRequest {
    pub queue_id: QueueId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderRequest {
    pub order: Vec<QueueId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostStateRequest {
    pub now_playing: Option<NowPlaying>,
}

/// Arguments of a guest/host playback control request.
///
/// Only `control:seek` uses `secs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Typed client request. Decode with [`ClientMessage::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session:create")]
    SessionCreate {
        #[serde(default)]
        payload: CreateSessionRequest,
    },
    #[serde(rename = "session:join")]
    SessionJoin {
        #[serde(default)]
        payload: JoinSessionRequest,
    },
    #[serde(rename = "session:leave")]
    SessionLeave {
        #[serde(default)]
        payload: EmptyPayload,
    },
    #[serde(rename = "session:setGuestControl")]
    SetGuestControl {
        #[serde(default)]
        payload: GuestControlRequest,
    },
    #[serde(rename = "session:setPartyMode")]
    SetPartyMode {
        #[serde(default)]
        payload: PartyModeRequest,
    },
    #[serde(rename = "queue:add")]
    QueueAdd {
        #[serde(default)]
        payload: AddTrackRequest,
    },
    #[serde(rename = "queue:remove")]
    QueueRemove {
        #[serde(default)]
        payload: RemoveTrackRequest,
    },
    #[serde(rename = "queue:reorder")]
    QueueReorder {
        #[serde(default)]
        payload: ReorderRequest,
    },
    #[serde(rename = "host:state")]
    HostState {
        #[serde(default)]
        payload: HostStateRequest,
    },
    #[serde(rename = "control:next")]
    ControlNext {
        #[serde(default)]
        payload: ControlRequest,
    },
    #[serde(rename = "control:prev")]
    ControlPrev {
        #[serde(default)]
        payload: ControlRequest,
    },
    #[serde(rename = "control:toggle")]
    ControlToggle {
        #[serde(default)]
        payload: ControlRequest,
    },
    #[serde(rename = "control:seek")]
    ControlSeek {
        #[serde(default)]
        payload: ControlRequest,
    },
    #[serde(rename = "heartbeat")]
    Heartbeat {
        #[serde(default)]
        payload: EmptyPayload,
    },
}

/// Playback control kinds a member can ask the host to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Next,
    Prev,
    Toggle,
    Seek,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Next => "control:next",
            Self::Prev => "control:prev",
            Self::Toggle => "control:toggle",
            Self::Seek => "control:seek",
        }
    }
}

impl ClientMessage {
    /// Decodes a text frame into a typed request.
    ///
    /// A missing or `null` payload is treated as `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidInput`] for malformed JSON, a missing or
    /// unknown `type`, or a payload that does not fit the message kind.
    pub fn decode(text: &str) -> SyncResult<Self> {
        let mut value: Value = serde_json::from_str(text)
            .map_err(|_| SyncError::InvalidInput("Invalid JSON".into()))?;

        let Some(obj) = value.as_object_mut() else {
            return Err(SyncError::InvalidInput("Invalid JSON".into()));
        };

        let msg_type = match obj.get("type") {
            Some(Value::String(t)) => t.clone(),
            _ => return Err(SyncError::InvalidInput("Missing message type".into())),
        };
        if !CLIENT_MESSAGE_TYPES.contains(&msg_type.as_str()) {
            return Err(SyncError::InvalidInput(format!(
                "Unknown message type: {}",
                msg_type
            )));
        }

        if matches!(obj.get("payload"), None | Some(Value::Null)) {
            obj.insert("payload".into(), Value::Object(Default::default()));
        }

        serde_json::from_value(value)
            .map_err(|_| SyncError::InvalidInput(format!("Invalid {} payload", msg_type)))
    }

    /// Serializes the request to its wire form.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreate { .. } => "session:create",
            Self::SessionJoin { .. } => "session:join",
            Self::SessionLeave { .. } => "session:leave",
            Self::SetGuestControl { .. } => "session:setGuestControl",
            Self::SetPartyMode { .. } => "session:setPartyMode",
            Self::QueueAdd { .. } => "queue:add",
            Self::QueueRemove { .. } => "queue:remove",
            Self::QueueReorder { .. } => "queue:reorder",
            Self::HostState { .. } => "host:state",
            Self::ControlNext { .. } => "control:next",
            Self::ControlPrev { .. } => "control:prev",
            Self::ControlToggle { .. } => "control:toggle",
            Self::ControlSeek { .. } => "control:seek",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Builds the request for a playback control.
    pub fn control(kind: ControlKind, secs: Option<f64>) -> Self {
        let payload = ControlRequest { secs };
        match kind {
            ControlKind::Next => Self::ControlNext { payload },
            ControlKind::Prev => Self::ControlPrev { payload },
            ControlKind::Toggle => Self::ControlToggle { payload },
            ControlKind::Seek => Self::ControlSeek { payload },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// A control request as delivered to the host, annotated with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secs: Option<f64>,
    pub from_user_id: MemberId,
    pub from_name: String,
    pub session_id: String,
}

/// Typed server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "hello", rename_all = "camelCase")]
    Hello { user_id: MemberId },

    #[serde(rename = "session:created", rename_all = "camelCase")]
    SessionCreated { session_id: String },

    #[serde(rename = "session:state")]
    SessionState(SessionSnapshot),

    #[serde(rename = "queue:updated")]
    QueueUpdated { queue: Vec<QueueItem> },

    #[serde(rename = "nowPlaying:updated", rename_all = "camelCase")]
    NowPlayingUpdated { now_playing: Option<NowPlaying> },

    #[serde(rename = "control:next")]
    ControlNext { payload: ForwardedControl },

    #[serde(rename = "control:prev")]
    ControlPrev { payload: ForwardedControl },

    #[serde(rename = "control:toggle")]
    ControlToggle { payload: ForwardedControl },

    #[serde(rename = "control:seek")]
    ControlSeek { payload: ForwardedControl },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: String,
    },

    #[serde(rename = "heartbeat:ack")]
    HeartbeatAck,
}

impl ServerMessage {
    /// Wraps a registry error for delivery to the requester.
    pub fn error(err: &SyncError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code().to_string(),
        }
    }

    /// The terminal notice broadcast when the host disconnects.
    pub fn session_ended() -> Self {
        Self::Error {
            message: SESSION_ENDED_MESSAGE.to_string(),
            code: SESSION_ENDED_CODE.to_string(),
        }
    }

    /// Builds a forwarded control message of the given kind.
    pub fn forwarded(kind: ControlKind, payload: ForwardedControl) -> Self {
        match kind {
            ControlKind::Next => Self::ControlNext { payload },
            ControlKind::Prev => Self::ControlPrev { payload },
            ControlKind::Toggle => Self::ControlToggle { payload },
            ControlKind::Seek => Self::ControlSeek { payload },
        }
    }

    /// Splits a forwarded control into its kind and payload.
    pub fn as_forwarded(&self) -> Option<(ControlKind, &ForwardedControl)> {
        match self {
            Self::ControlNext { payload } => Some((ControlKind::Next, payload)),
            Self::ControlPrev { payload } => Some((ControlKind::Prev, payload)),
            Self::ControlToggle { payload } => Some((ControlKind::Toggle, payload)),
            Self::ControlSeek { payload } => Some((ControlKind::Seek, payload)),
            _ => None,
        }
    }

    /// Serializes the message to its wire form.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes a server frame (client side).
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ─────────────────────────────────────────────────────────────────────────
    // Decoding
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn decodes_join_with_payload() {
        let msg = ClientMessage::decode(
            r#"{"type":"session:join","payload":{"sessionId":"abc123","displayName":"Bo"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::SessionJoin {
                payload: JoinSessionRequest {
                    session_id: "abc123".into(),
                    display_name: Some("Bo".into()),
                }
            }
        );
    }

    #[test]
    fn missing_or_null_payload_is_empty_object() {
        let a = ClientMessage::decode(r#"{"type":"control:next"}"#).unwrap();
        let b = ClientMessage::decode(r#"{"type":"control:next","payload":null}"#).unwrap();
        assert_eq!(a, ClientMessage::control(ControlKind::Next, None));
        assert_eq!(a, b);
    }

    #[test]
    fn host_state_accepts_fractional_playhead() {
        let msg = ClientMessage::decode(
            r#"{"type":"host:state","payload":{"nowPlaying":{"queueId":"q1","isPlaying":true,"playheadMs":12345.678}}}"#,
        )
        .unwrap();
        let ClientMessage::HostState { payload } = msg else {
            panic!("expected host:state");
        };
        assert_eq!(payload.now_playing.map(|np| np.playhead_ms), Some(12_346));
    }

    #[test]
    fn unknown_type_is_invalid_input() {
        let err = ClientMessage::decode(r#"{"type":"queue:shuffle"}"#).unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidInput("Unknown message type: queue:shuffle".into())
        );
    }

    #[test]
    fn malformed_frames_are_invalid_input() {
        assert_eq!(
            ClientMessage::decode("not json").unwrap_err(),
            SyncError::InvalidInput("Invalid JSON".into())
        );
        assert_eq!(
            ClientMessage::decode(r#"{"payload":{}}"#).unwrap_err(),
            SyncError::InvalidInput("Missing message type".into())
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"queue:reorder","payload":{"order":"x"}}"#)
                .unwrap_err(),
            SyncError::InvalidInput("Invalid queue:reorder payload".into())
        );
    }

    #[test]
    fn every_known_type_decodes_with_empty_payload() {
        for ty in CLIENT_MESSAGE_TYPES {
            let msg = ClientMessage::decode(&json!({ "type": ty }).to_string()).unwrap();
            assert_eq!(msg.kind(), *ty);
        }
    }

    #[test]
    fn client_message_round_trips_through_encode() {
        let msg = ClientMessage::control(ControlKind::Seek, Some(42.5));
        assert_eq!(ClientMessage::decode(&msg.encode()).unwrap(), msg);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encoding
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn hello_uses_top_level_user_id() {
        let value = serde_json::to_value(ServerMessage::Hello {
            user_id: "u1".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "hello", "userId": "u1"}));
    }

    #[test]
    fn cleared_now_playing_serializes_as_null() {
        let value = serde_json::to_value(ServerMessage::NowPlayingUpdated { now_playing: None })
            .unwrap();
        assert_eq!(value, json!({"type": "nowPlaying:updated", "nowPlaying": null}));
    }

    #[test]
    fn session_state_flattens_snapshot() {
        let snapshot = SessionSnapshot {
            session_id: "ABC123".into(),
            host_user_id: "h".into(),
            allow_guest_control: false,
            party_mode: false,
            members: vec![],
            queue: vec![],
            now_playing: None,
        };
        let value = serde_json::to_value(ServerMessage::SessionState(snapshot.clone())).unwrap();
        assert_eq!(value["type"], "session:state");
        assert_eq!(value["sessionId"], "ABC123");
        assert_eq!(value["hostUserId"], "h");
        assert!(value["nowPlaying"].is_null());

        let decoded = ServerMessage::decode(&value.to_string()).unwrap();
        assert_eq!(decoded, ServerMessage::SessionState(snapshot));
    }

    #[test]
    fn forwarded_control_wraps_origin_in_payload() {
        let msg = ServerMessage::forwarded(
            ControlKind::Seek,
            ForwardedControl {
                secs: Some(30.0),
                from_user_id: "g".into(),
                from_name: "Guest".into(),
                session_id: "ABC123".into(),
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "control:seek");
        assert_eq!(value["payload"]["fromUserId"], "g");
        assert_eq!(value["payload"]["fromName"], "Guest");
        assert_eq!(value["payload"]["secs"], 30.0);
        assert_eq!(msg.as_forwarded().map(|(k, _)| k), Some(ControlKind::Seek));
    }

    #[test]
    fn error_envelope_carries_code() {
        let value =
            serde_json::to_value(ServerMessage::error(&SyncError::NotFound("Session not found".into())))
                .unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "message": "Session not found", "code": "not_found"})
        );
        let ended = serde_json::to_value(ServerMessage::session_ended()).unwrap();
        assert_eq!(ended["code"], SESSION_ENDED_CODE);
    }

    #[test]
    fn heartbeat_ack_is_bare_type() {
        let value = serde_json::to_value(ServerMessage::HeartbeatAck).unwrap();
        assert_eq!(value, json!({"type": "heartbeat:ack"}));
    }
}

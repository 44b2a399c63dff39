//! Domain events emitted by the session registry.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the registry to report lifecycle changes
//! - [`SessionEvent`] and [`ConnectionEvent`] types
//!
//! Events are observational only. Members learn about state through the
//! protocol messages fanned out by the registry, never through these events.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEndReason {
    /// The host's connection closed or the host left.
    HostLeft,
    /// The last member left.
    Empty,
}

/// Events related to session lifecycle and permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A new session was created.
    #[serde(rename_all = "camelCase")]
    Created {
        session_id: String,
        host_user_id: String,
        timestamp: u64,
    },
    /// A member joined an existing session.
    #[serde(rename_all = "camelCase")]
    MemberJoined {
        session_id: String,
        user_id: String,
        member_count: usize,
        timestamp: u64,
    },
    /// A non-host member left a session that lives on.
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        session_id: String,
        user_id: String,
        member_count: usize,
        timestamp: u64,
    },
    /// The session was deleted.
    #[serde(rename_all = "camelCase")]
    Ended {
        session_id: String,
        reason: SessionEndReason,
        timestamp: u64,
    },
    /// The host toggled guest control.
    #[serde(rename_all = "camelCase")]
    GuestControlChanged {
        session_id: String,
        allow_guest_control: bool,
        timestamp: u64,
    },
    /// The host toggled party mode.
    #[serde(rename_all = "camelCase")]
    PartyModeChanged {
        session_id: String,
        party_mode: bool,
        timestamp: u64,
    },
}

/// Events related to transport connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// A connection was assigned a member id.
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String, timestamp: u64 },
    /// A connection closed.
    #[serde(rename_all = "camelCase")]
    Disconnected { user_id: String, timestamp: u64 },
}

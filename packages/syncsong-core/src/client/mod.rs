//! Client synchronization engine.
//!
//! This module provides:
//! - [`SyncClient`] which keeps one member's local playback consistent with
//!   the session's shared now-playing state
//! - [`ProviderAdapter`] and [`TrackResolver`] seams for playback backends
//! - The pure planners it is built from ([`Reconciler`], [`EndDetector`],
//!   [`play_next`]/[`play_previous`])
//! - [`transport::connect`] to reach a registry over WebSocket
//!
//! The host's adapter is the source of truth for the shared playhead. Every
//! other member follows the host by loading, pausing and seeking locally.

mod advance;
mod controller;
mod end_detector;
mod poller;
mod provider;
mod reconcile;
mod resolver;
pub mod transport;
mod view;

pub use advance::{play_next, play_previous};
pub use controller::{AdvanceLock, SyncClient};
pub use end_detector::EndDetector;
pub use poller::{PollContext, PollTask, Poller};
pub use provider::{PlaybackSample, ProviderAdapter, ProviderError};
pub use reconcile::{load_key, ReconcileAction, Reconciler};
pub use resolver::{CachingResolver, ChainResolver, SourceIdResolver, TrackResolver};
pub use view::{SessionView, ViewChange};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;
use crate::protocol_constants::{
    ADVANCE_LOCK_TIMEOUT_MS, DRIFT_TOLERANCE_MS, END_BUFFER_MS, POLL_INTERVAL_MS,
    SEEK_COOLDOWN_MS, SNAP_TO_ZERO_MS, TRANSITION_COOLDOWN_MS,
};

/// Tunables for the synchronization engine. All durations in milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncClientConfig {
    /// Host-side sampling interval. 0 disables the background loop; the
    /// embedder then drives sampling with [`SyncClient::poll_now`].
    pub poll_interval_ms: u64,

    /// Local/shared playhead difference tolerated before seeking.
    pub drift_tolerance_ms: u64,

    /// Minimum time between corrective seeks. Host publishes are also held
    /// this long after a seek or play/pause toggle.
    pub seek_cooldown_ms: u64,

    /// Publishes suppressed after a track transition.
    pub transition_cooldown_ms: u64,

    /// How close to the end the furthest position must get to count as
    /// "reached the end".
    pub end_buffer_ms: u64,

    /// Positions at or below this count as "snapped back to zero".
    pub snap_to_zero_ms: u64,

    /// Safety release for a stuck auto-advance.
    pub advance_lock_timeout_ms: u64,

    /// Wrap around at either end of the queue.
    pub loop_queue: bool,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            drift_tolerance_ms: DRIFT_TOLERANCE_MS,
            seek_cooldown_ms: SEEK_COOLDOWN_MS,
            transition_cooldown_ms: TRANSITION_COOLDOWN_MS,
            end_buffer_ms: END_BUFFER_MS,
            snap_to_zero_ms: SNAP_TO_ZERO_MS,
            advance_lock_timeout_ms: ADVANCE_LOCK_TIMEOUT_MS,
            loop_queue: false,
        }
    }
}

/// Error returned by [`SyncClient`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The outgoing channel to the registry is closed.
    #[error("Not connected to the session server")]
    Disconnected,

    /// The outgoing channel is full; the request was dropped.
    #[error("Too many pending requests")]
    OutboxFull,

    #[error("Not in a valid session")]
    NotInSession,

    /// A host-only operation was attempted by a guest.
    #[error("Only the host can do that")]
    NotHost,

    #[error("Queue item not found: {0}")]
    UnknownQueueItem(String),

    #[error("No provider named {0}")]
    UnknownProvider(String),

    #[error("Invalid seek position: {0}")]
    InvalidSeek(f64),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ErrorCode for ClientError {
    fn code(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::OutboxFull => "outbox_full",
            Self::NotInSession => "not_in_session",
            Self::NotHost => "not_host",
            Self::UnknownQueueItem(_) => "unknown_queue_item",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::InvalidSeek(_) => "invalid_seek",
            Self::Provider(err) => err.code(),
        }
    }
}

/// User-visible state of the engine, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ClientStatus {
    /// Not in a session.
    #[default]
    Idle,
    /// In a session and local playback matches the shared state.
    Synced,
    /// The last provider call failed; the next update retries.
    ProviderError(String),
    /// The registry rejected one of our requests.
    Rejected(String),
    /// The host left and the session is gone.
    SessionEnded(String),
    /// The server connection closed.
    Disconnected,
}

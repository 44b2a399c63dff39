//! SyncSong Core - shared library for SyncSong listening sessions.
//!
//! SyncSong lets a small group listen to the same music at roughly the same
//! position, each through their own playback provider. One member hosts a
//! session; everyone shares a queue and a single "now playing" fact, and each
//! member's client keeps its local playback in line with that fact.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: The authoritative session registry and queue
//! - [`protocol`]: Typed WebSocket messages in both directions
//! - [`model`]: Tracks, queue items, now-playing and snapshots
//! - [`api`]: HTTP/WebSocket server in front of the registry
//! - [`client`]: The per-member synchronization engine
//! - [`events`]: Event system for observing session lifecycle
//! - [`state`]: Server configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`EventEmitter`](events::EventEmitter): Observing registry events
//! - [`ProviderAdapter`](client::ProviderAdapter): One playback backend
//! - [`TrackResolver`](client::TrackResolver): Mapping tracks onto a provider
//!
//! The standalone server uses the logging emitter. Provider adapters and
//! resolvers are supplied by the embedding application.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod error;
pub mod events;
pub mod model;
pub mod protocol;
pub mod protocol_constants;
pub mod session;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, SyncError, SyncResult};
pub use events::{
    ConnectionEvent, EventEmitter, LoggingEventEmitter, NoopEventEmitter, SessionEndReason,
    SessionEvent,
};
pub use model::{
    AddedBy, IncomingTrack, MemberId, MemberInfo, NowPlaying, QueueId, QueueItem,
    SessionSnapshot, Track, TrackSource,
};
pub use protocol::{ClientMessage, ControlKind, ForwardedControl, ServerMessage};
pub use session::{Registry, SessionRegistry};
pub use state::Config;
pub use utils::now_millis;

// Re-export client engine types
pub use client::{
    ClientError, ClientStatus, PlaybackSample, ProviderAdapter, ProviderError, SyncClient,
    SyncClientConfig, TrackResolver,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with_emitter, BootstrappedServices};

// Re-export API types
pub use api::{bind, serve, start_server, AppState, ServerError, WsConnectionManager};

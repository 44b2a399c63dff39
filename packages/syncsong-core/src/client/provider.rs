//! Provider adapter abstraction.
//!
//! A provider adapter wraps one playback backend (a streaming SDK, a local
//! media-control bridge) behind a uniform surface. Adapters are supplied by
//! the embedding application; the engine only consumes this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ErrorCode;

/// One position report from a provider's playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSample {
    pub is_playing: bool,
    pub position_ms: u64,
    /// Duration as reported by the provider, when it knows it.
    pub duration_ms: Option<u64>,
}

/// Transient failure of a provider call. Local to the client; never sent to
/// the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider's auth/connect step has not completed.
    #[error("{provider} is not connected")]
    NotConnected { provider: String },

    /// The provider rejected or failed a playback call.
    #[error("{provider}: {message}")]
    Call { provider: String, message: String },

    /// No playable id could be resolved for the track.
    #[error("{title} is not playable on {provider}")]
    Unresolved { provider: String, title: String },
}

impl ErrorCode for ProviderError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected { .. } => "provider_not_connected",
            Self::Call { .. } => "provider_call_failed",
            Self::Unresolved { .. } => "track_unresolved",
        }
    }
}

/// Uniform capability surface over one playback backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, matching [`TrackSource`](crate::model::TrackSource)
    /// names where applicable (`spotify`, `apple`, `itunes`).
    fn name(&self) -> &str;

    /// Loads the resolved id and starts playback from the beginning.
    async fn play_track(&self, resolved_id: &str) -> Result<(), ProviderError>;

    async fn play(&self) -> Result<(), ProviderError>;

    async fn pause(&self) -> Result<(), ProviderError>;

    async fn seek(&self, seconds: f64) -> Result<(), ProviderError>;

    /// Sets output volume in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<(), ProviderError>;

    /// Samples the engine. `Ok(None)` means no reading is available right now
    /// and is not an error.
    async fn playback_state(&self) -> Result<Option<PlaybackSample>, ProviderError>;
}

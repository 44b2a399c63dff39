//! Shared domain types carried on the wire.
//!
//! These are the provider-agnostic facts every session member sees: tracks,
//! queue entries, the now-playing snapshot and the member roster.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::protocol_constants::{MAX_ALBUM_LEN, MAX_URL_LEN};
use crate::utils::truncate_chars;

/// Opaque, connection-scoped member identifier.
pub type MemberId = String;

/// Server-generated queue item identifier.
pub type QueueId = String;

/// Reads a millisecond value that may arrive as a fractional number.
/// Rounds to the nearest millisecond; negative or non-finite values read as 0.
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    })
}

/// Provider the track metadata originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Spotify,
    Apple,
    Itunes,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TrackSource {
    /// Parses a provider name, mapping anything unrecognized to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "spotify" => Self::Spotify,
            "apple" => Self::Apple,
            "itunes" => Self::Itunes,
            _ => Self::Unknown,
        }
    }

    /// Streaming providers identify tracks by catalog id, so a `sourceId`
    /// is mandatory for them.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Spotify | Self::Apple)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Apple => "apple",
            Self::Itunes => "itunes",
            Self::Unknown => "unknown",
        }
    }
}

/// Provider-agnostic track metadata. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Track {
    pub source: TrackSource,
    pub source_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(deserialize_with = "millis")]
    pub duration_ms: u64,
    pub artwork_url: String,
    pub url: String,
    /// International Standard Recording Code, used for cross-provider matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

/// Track payload as submitted by a client, before validation.
///
/// Accepts the legacy per-provider id fields some clients still send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomingTrack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_track_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itunes_persistent_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itunes_track_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

impl From<&Track> for IncomingTrack {
    fn from(track: &Track) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            source: Some(track.source.as_str().to_string()),
            source_id: non_empty(&track.source_id).map(Value::String),
            title: Some(track.title.clone()),
            artist: Some(track.artist.clone()),
            album: non_empty(&track.album),
            duration_ms: (track.duration_ms > 0).then_some(track.duration_ms as f64),
            artwork_url: non_empty(&track.artwork_url),
            url: non_empty(&track.url),
            isrc: track.isrc.clone(),
            ..Default::default()
        }
    }
}

/// Renders a JSON scalar id (string or number) as a trimmed string.
fn id_to_string(value: &Option<Value>) -> Option<String> {
    let raw = match value.as_ref()? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!raw.is_empty()).then_some(raw)
}

impl IncomingTrack {
    /// Validates and normalizes the submitted track.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidInput`] when `title` or `artist` is blank,
    /// or when a streaming-provider track has no `sourceId`.
    pub fn validate(self) -> SyncResult<Track> {
        let title = self.title.as_deref().unwrap_or("").trim().to_string();
        let artist = self.artist.as_deref().unwrap_or("").trim().to_string();
        if title.is_empty() || artist.is_empty() {
            return Err(SyncError::InvalidInput(
                "Invalid track (missing title/artist)".into(),
            ));
        }

        let source = self
            .source
            .as_deref()
            .map(TrackSource::parse)
            .unwrap_or_default();
        let source_id = id_to_string(&self.source_id)
            .or_else(|| id_to_string(&self.spotify_track_id))
            .or_else(|| id_to_string(&self.itunes_persistent_id))
            .or_else(|| id_to_string(&self.itunes_track_id))
            .unwrap_or_default();

        if source.is_streaming() && source_id.is_empty() {
            return Err(SyncError::InvalidInput(
                "Invalid track (missing sourceId)".into(),
            ));
        }

        let duration_ms = self
            .duration_ms
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(0);

        Ok(Track {
            source,
            source_id,
            title,
            artist,
            album: truncate_chars(self.album.as_deref().unwrap_or(""), MAX_ALBUM_LEN),
            duration_ms,
            artwork_url: truncate_chars(self.artwork_url.as_deref().unwrap_or(""), MAX_URL_LEN),
            url: truncate_chars(self.url.as_deref().unwrap_or(""), MAX_URL_LEN),
            isrc: self
                .isrc
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Snapshot of who queued an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedBy {
    pub user_id: MemberId,
    pub display_name: String,
}

/// One entry in a session's shared queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub queue_id: QueueId,
    pub track: Track,
    pub added_by: AddedBy,
    /// Server timestamp (Unix ms).
    pub added_at: u64,
}

/// The single shared playback fact of a session.
///
/// Always replaced wholesale. `playhead_ms` is a position sampled from a
/// provider adapter, never extrapolated from a wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NowPlaying {
    pub queue_id: Option<QueueId>,
    pub track: Option<Track>,
    pub is_playing: bool,
    #[serde(deserialize_with = "millis")]
    pub playhead_ms: u64,
    /// Server timestamp (Unix ms) of the publish that produced this value.
    #[serde(deserialize_with = "millis")]
    pub updated_at: u64,
}

impl NowPlaying {
    /// Builds a now-playing value for a queue item at the start of the track.
    pub fn for_item(item: &QueueItem, is_playing: bool) -> Self {
        Self {
            queue_id: Some(item.queue_id.clone()),
            track: Some(item.track.clone()),
            is_playing,
            playhead_ms: 0,
            updated_at: 0,
        }
    }

    /// Returns the known duration of the current track, if any.
    pub fn duration_ms(&self) -> Option<u64> {
        self.track
            .as_ref()
            .map(|t| t.duration_ms)
            .filter(|d| *d > 0)
    }
}

/// Roster entry as shown to members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub user_id: MemberId,
    pub display_name: String,
}

/// Full session state as broadcast on create/join/roster change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub host_user_id: MemberId,
    pub allow_guest_control: bool,
    pub party_mode: bool,
    pub members: Vec<MemberInfo>,
    pub queue: Vec<QueueItem>,
    pub now_playing: Option<NowPlaying>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn incoming(value: Value) -> IncomingTrack {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn streaming_track_requires_source_id() {
        let err = incoming(json!({"title": "X", "artist": "Y", "source": "spotify"}))
            .validate()
            .unwrap_err();
        assert_eq!(err, SyncError::InvalidInput("Invalid track (missing sourceId)".into()));
    }

    #[test]
    fn local_track_may_omit_source_id() {
        let track = incoming(json!({"title": "X", "artist": "Y", "source": "itunes"}))
            .validate()
            .unwrap();
        assert_eq!(track.source, TrackSource::Itunes);
        assert!(track.source_id.is_empty());
    }

    #[test]
    fn blank_title_or_artist_is_rejected() {
        assert!(incoming(json!({"title": "  ", "artist": "Y"})).validate().is_err());
        assert!(incoming(json!({"title": "X"})).validate().is_err());
    }

    #[test]
    fn legacy_id_fields_fill_source_id() {
        let track = incoming(json!({
            "title": "X", "artist": "Y", "source": "spotify", "spotifyTrackId": "abc"
        }))
        .validate()
        .unwrap();
        assert_eq!(track.source_id, "abc");

        let track = incoming(json!({
            "title": "X", "artist": "Y", "source": "itunes", "itunesTrackId": 4242
        }))
        .validate()
        .unwrap();
        assert_eq!(track.source_id, "4242");
    }

    #[test]
    fn unknown_source_and_limits_are_normalized() {
        let track = incoming(json!({
            "title": " X ", "artist": "Y", "source": "tidal",
            "album": "a".repeat(200), "url": "u".repeat(900), "durationMs": 200000.7
        }))
        .validate()
        .unwrap();
        assert_eq!(track.title, "X");
        assert_eq!(track.source, TrackSource::Unknown);
        assert_eq!(track.album.chars().count(), MAX_ALBUM_LEN);
        assert_eq!(track.url.chars().count(), MAX_URL_LEN);
        assert_eq!(track.duration_ms, 200000);
    }

    #[test]
    fn queued_track_round_trips_through_incoming_form() {
        let track = Track {
            source: TrackSource::Apple,
            source_id: "1440".into(),
            title: "X".into(),
            artist: "Y".into(),
            duration_ms: 1_000,
            isrc: Some("USRC17607839".into()),
            ..Default::default()
        };
        assert_eq!(IncomingTrack::from(&track).validate().unwrap(), track);
    }

    #[test]
    fn track_serializes_camel_case() {
        let track = Track {
            source: TrackSource::Spotify,
            source_id: "t1".into(),
            title: "X".into(),
            artist: "Y".into(),
            duration_ms: 200_000,
            ..Default::default()
        };
        let value = serde_json::to_value(&track).unwrap();
        assert_eq!(value["source"], "spotify");
        assert_eq!(value["sourceId"], "t1");
        assert_eq!(value["durationMs"], 200_000);
        assert!(value.get("isrc").is_none());
    }

    #[test]
    fn unrecognized_source_deserializes_as_unknown() {
        let track: Track = serde_json::from_value(json!({"source": "deezer"})).unwrap();
        assert_eq!(track.source, TrackSource::Unknown);
    }

    #[test]
    fn now_playing_tolerates_missing_fields() {
        let np: NowPlaying =
            serde_json::from_value(json!({"queueId": "q1", "isPlaying": true})).unwrap();
        assert_eq!(np.queue_id.as_deref(), Some("q1"));
        assert_eq!(np.playhead_ms, 0);
        assert!(np.track.is_none());
        assert_eq!(np.duration_ms(), None);
    }

    #[test]
    fn fractional_millis_are_rounded() {
        let np: NowPlaying = serde_json::from_value(json!({
            "queueId": "q1",
            "isPlaying": true,
            "playheadMs": 83_456.7,
            "updatedAt": 1_700_000_000_000.2,
            "track": {"title": "X", "artist": "Y", "durationMs": 215_999.6}
        }))
        .unwrap();
        assert_eq!(np.playhead_ms, 83_457);
        assert_eq!(np.updated_at, 1_700_000_000_000);
        assert_eq!(np.duration_ms(), Some(216_000));

        let np: NowPlaying =
            serde_json::from_value(json!({"playheadMs": -12.0, "updatedAt": 5})).unwrap();
        assert_eq!(np.playhead_ms, 0);
        assert_eq!(np.updated_at, 5);
    }
}

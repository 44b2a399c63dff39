//! Protocol constants and tunable defaults.
//!
//! Wire-level limits shared by server and client live here, together with the
//! default thresholds used by the client synchronization engine.

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Random bytes per session code (rendered as uppercase hex, so 6 characters).
pub const SESSION_CODE_BYTES: usize = 3;

/// Random bytes per member / queue item id (rendered as lowercase hex).
pub const MEMBER_ID_BYTES: usize = 8;

/// Attempts at generating an unused session code before giving up.
pub const SESSION_CODE_MAX_ATTEMPTS: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Payload Limits
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum display name length (characters).
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Display name given to a session creator that supplied none.
pub const DEFAULT_HOST_NAME: &str = "Host";

/// Display name given to a joining member that supplied none.
pub const DEFAULT_GUEST_NAME: &str = "Guest";

/// Maximum album title length (characters).
pub const MAX_ALBUM_LEN: usize = 120;

/// Maximum artwork / track URL length (characters).
pub const MAX_URL_LEN: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Default server port (matches the `PORT` convention of hosted deployments).
pub const DEFAULT_PORT: u16 = 3000;

/// Close connections that have been silent for this long (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// Interval between idle checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 5;

/// Interval between server-initiated pings (seconds).
pub const WS_PING_INTERVAL_SECS: u64 = 30;

/// Outbound messages buffered per member before sends start failing.
pub const MEMBER_OUTBOX_CAPACITY: usize = 256;

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "syncsong";

// ─────────────────────────────────────────────────────────────────────────────
// Client Synchronization
// ─────────────────────────────────────────────────────────────────────────────

/// Host poll interval for the active provider (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 500;

/// Drift beyond which a reconciling client seeks (milliseconds).
pub const DRIFT_TOLERANCE_MS: u64 = 1000;

/// Quiet period after a seek during which drift correction is suppressed.
pub const SEEK_COOLDOWN_MS: u64 = 1500;

/// Quiet period after a host-initiated transition during which pollers do not publish.
pub const TRANSITION_COOLDOWN_MS: u64 = 1500;

/// A track counts as finished when the max observed position came within this
/// distance of its duration (milliseconds).
pub const END_BUFFER_MS: u64 = 2500;

/// Positions at or below this value count as "snapped back to zero".
pub const SNAP_TO_ZERO_MS: u64 = 1500;

/// Safety release for the auto-advance lock (milliseconds).
pub const ADVANCE_LOCK_TIMEOUT_MS: u64 = 8000;

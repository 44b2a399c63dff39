//! Core configuration types.
//!
//! [`Config`] carries every server-side tunable. The standalone server
//! deserializes it from YAML and layers environment/CLI overrides on top.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_PORT, MAX_DISPLAY_NAME_LEN, MEMBER_OUTBOX_CAPACITY, WS_HEARTBEAT_CHECK_INTERVAL_SECS,
    WS_HEARTBEAT_TIMEOUT_SECS, WS_PING_INTERVAL_SECS,
};

/// Configuration for the SyncSong server.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Origins allowed by CORS. A single `"*"` allows any origin.
    pub cors_origins: Vec<String>,

    // WebSocket
    /// Close connections silent for longer than this (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Interval between server pings (seconds).
    pub ws_ping_interval_secs: u64,

    // Sessions
    /// Outbound messages buffered per member.
    pub member_outbox_capacity: usize,

    /// Maximum display name length (characters).
    pub max_display_name_len: usize,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first value that would cause runtime issues.
    pub fn validate(&self) -> Result<(), String> {
        if self.member_outbox_capacity == 0 {
            return Err(
                "member_outbox_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        if self.ws_heartbeat_check_interval_secs == 0 || self.ws_ping_interval_secs == 0 {
            return Err("heartbeat and ping intervals must be >= 1 second".to_string());
        }
        if self.ws_heartbeat_timeout_secs <= self.ws_heartbeat_check_interval_secs {
            return Err(
                "ws_heartbeat_timeout_secs must exceed ws_heartbeat_check_interval_secs"
                    .to_string(),
            );
        }
        if self.max_display_name_len == 0 {
            return Err("max_display_name_len must be >= 1".to_string());
        }
        Ok(())
    }

    /// Returns true when CORS should allow any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o.trim() == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_PORT,
            cors_origins: vec!["*".to_string()],
            ws_heartbeat_timeout_secs: WS_HEARTBEAT_TIMEOUT_SECS,
            ws_heartbeat_check_interval_secs: WS_HEARTBEAT_CHECK_INTERVAL_SECS,
            ws_ping_interval_secs: WS_PING_INTERVAL_SECS,
            member_outbox_capacity: MEMBER_OUTBOX_CAPACITY,
            max_display_name_len: MAX_DISPLAY_NAME_LEN,
        }
    }
}

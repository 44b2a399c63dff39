//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::protocol_constants::{MEMBER_ID_BYTES, SESSION_CODE_BYTES};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

fn random_hex(len_bytes: usize) -> String {
    let uuid = Uuid::new_v4();
    uuid.as_bytes()
        .iter()
        .take(len_bytes)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Generates an opaque identifier for a connection or queue item.
#[must_use]
pub fn random_id() -> String {
    random_hex(MEMBER_ID_BYTES)
}

/// Generates a short, human-typeable session code (uppercase hex).
#[must_use]
pub fn random_session_code() -> String {
    random_hex(SESSION_CODE_BYTES).to_uppercase()
}

/// Normalizes a user-typed session code: surrounding whitespace is dropped
/// and letters are uppercased.
#[must_use]
pub fn normalize_session_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Text
// ─────────────────────────────────────────────────────────────────────────────

/// Truncates `value` to at most `max_chars` characters (not bytes).
#[must_use]
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Cleans a caller-supplied display name, falling back to `default` when blank.
#[must_use]
pub fn clean_display_name(raw: Option<&str>, default: &str, max_chars: usize) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => truncate_chars(name, max_chars),
        _ => default.to_string(),
    }
}

//! Event emitter abstraction for decoupling the registry from observers.
//!
//! The registry depends on the [`EventEmitter`] trait rather than a concrete
//! sink, enabling testing and alternative observers.

use super::{ConnectionEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of where they go.
pub trait EventEmitter: Send + Sync {
    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a connection lifecycle event.
    fn emit_connection(&self, event: ConnectionEvent);
}

/// No-op emitter for testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {
        // No-op
    }

    fn emit_connection(&self, _event: ConnectionEvent) {
        // No-op
    }
}

/// Logging emitter used by the standalone server.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }
}

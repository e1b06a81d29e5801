//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative delivery (UI bridge, logging).

use super::{SessionEvent, ZeroconfEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a zeroconf endpoint event.
    fn emit_zeroconf(&self, event: ZeroconfEvent);

    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for tests and embedders that observe state directly.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_zeroconf(&self, _event: ZeroconfEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_zeroconf(&self, event: ZeroconfEvent) {
        tracing::debug!(?event, "zeroconf_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

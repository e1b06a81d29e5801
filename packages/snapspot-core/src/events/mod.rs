//! Event system for downstream collaborators.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for fan-out over a broadcast channel
//! - Event types for the zeroconf endpoint and the session lifecycle

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Events broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the zeroconf listener and handshake handler.
    Zeroconf(ZeroconfEvent),

    /// Events from the session repository.
    Session(SessionEvent),
}

/// Events related to the zeroconf endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ZeroconfEvent {
    /// The listener bound its socket.
    Listening {
        port: u16,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A client fetched device info.
    InfoRequested {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A credential blob was verified and decrypted.
    UserAdded {
        username: String,
        /// Name of the submitting client device, if sent.
        #[serde(rename = "deviceName", skip_serializing_if = "Option::is_none")]
        device_name: Option<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A credential submission was refused.
    UserRejected {
        username: String,
        /// Machine-readable rejection code.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The listener stopped accepting connections.
    Stopped {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the session lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Session creation started.
    Creating {
        username: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A session became active.
    Created {
        username: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Session creation failed.
    Failed {
        username: String,
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A previously active session was closed.
    Closed {
        username: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<ZeroconfEvent> for BroadcastEvent {
    fn from(event: ZeroconfEvent) -> Self {
        BroadcastEvent::Zeroconf(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

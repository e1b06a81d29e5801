//! Snapspot Core - Spotify Connect zeroconf endpoint.
//!
//! This crate implements the device side of the Connect zeroconf handshake:
//! it answers `getInfo` with the device description and a Diffie-Hellman
//! public key, verifies and decrypts the credential blob posted by `addUser`,
//! and hands the credentials to an [`AccountAuthenticator`] that turns them
//! into a live session.
//!
//! # Architecture
//!
//! - [`zeroconf`]: TCP listener, request parsing and the handshake handler
//! - [`crypto`]: DH key exchange and credential blob decryption
//! - [`session`]: single-writer session repository and its state machine
//! - [`identity`]: device id, name and type
//! - [`events`]: Event system for observers
//! - [`context`]: Network configuration (port, advertise IP)
//! - [`bootstrap`]: Composition root
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`IpDetector`](context::IpDetector): Local IP detection
//! - [`AccountAuthenticator`](session::AccountAuthenticator): Turning
//!   credentials into a [`Session`](session::Session)

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod context;
pub mod crypto;
pub mod error;
pub mod events;
pub mod identity;
mod mdns_advertise;
pub mod protocol_constants;
pub mod runtime;
pub mod session;
pub mod state;
pub mod utils;
pub mod zeroconf;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use error::{ConnectError, ConnectResult, ErrorCode};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    SessionEvent, ZeroconfEvent,
};
pub use identity::{DeviceIdentity, DeviceType, IdentityError};
pub use mdns_advertise::MdnsAdvertiser;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{
    AccountAuthenticator, AuthenticationError, Session, SessionError, SessionInfo, SessionParams,
    SessionRepository, SessionState,
};
pub use state::Config;
pub use utils::now_millis;

// Re-export zeroconf types
pub use zeroconf::{ConnectHandler, HandleOutcome, ZeroconfListener};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

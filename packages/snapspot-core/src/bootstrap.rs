//! Service bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where the identity,
//! keypair, session repository, handshake handler and listener are created
//! and wired together.

use std::sync::Arc;

use crate::context::NetworkContext;
use crate::crypto::KeyExchange;
use crate::error::{ConnectError, ConnectResult, ErrorCode};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::identity::DeviceIdentity;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::session::{AccountAuthenticator, SessionRepository};
use crate::state::Config;
use crate::zeroconf::{ConnectHandler, PendingConnection, ZeroconfListener};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Identity advertised in `getInfo` and over mDNS.
    pub identity: Arc<DeviceIdentity>,
    /// DH keypair for this process.
    pub key_exchange: Arc<KeyExchange>,
    /// In-flight `addUser` slot.
    pub pending: Arc<PendingConnection>,
    /// Owns the active session.
    pub sessions: Arc<SessionRepository>,
    /// Zeroconf accept loop.
    pub listener: Arc<ZeroconfListener>,
    /// Event bridge for subscribers and an optional external emitter.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Network configuration (port, advertise IP).
    pub network: NetworkContext,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
}

impl BootstrappedServices {
    /// Binds the listener, records the port and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Bind`] if the socket cannot be bound.
    pub async fn start(&self) -> ConnectResult<u16> {
        let port = self.listener.init_and_get_port().await?;
        self.network.set_port(port);

        let listener = Arc::clone(&self.listener);
        self.spawner.spawn(async move {
            if let Err(e) = listener.run().await {
                log::error!("[Bootstrap] Listener exited ({}): {}", e.code(), e);
            }
        });
        Ok(port)
    }

    /// Stops the listener and closes the active session.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.listener.shutdown();

        if self.sessions.close().await {
            log::info!("[Bootstrap] Closed active session");
        }
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services with their dependencies.
///
/// Wiring order:
///
/// 1. Identity (persisted when `data_dir` is set) and DH keypair
/// 2. Event bridge
/// 3. Session repository (depends on authenticator, events)
/// 4. Handshake handler (depends on identity, keypair, repository)
/// 5. Listener (depends on handler)
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the identity cannot
/// be persisted.
pub fn bootstrap_services(
    config: &Config,
    network: NetworkContext,
    authenticator: Arc<dyn AccountAuthenticator>,
) -> ConnectResult<BootstrappedServices> {
    config.validate().map_err(ConnectError::Configuration)?;

    let spawner = TokioSpawner::current();

    let identity = Arc::new(match &config.data_dir {
        Some(dir) => DeviceIdentity::load_or_create(
            dir,
            config.device_type,
            config.device_name.clone(),
            config.locale.clone(),
        )?,
        None => DeviceIdentity::ephemeral(
            config.device_type,
            config.device_name.clone(),
            config.locale.clone(),
        ),
    });
    log::info!(
        "[Bootstrap] Device '{}' ({}) id {}",
        identity.name,
        identity.device_type,
        identity.id
    );

    let key_exchange = Arc::new(KeyExchange::generate());
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    let sessions = Arc::new(SessionRepository::new(
        authenticator,
        Arc::clone(&emitter),
        spawner.clone(),
    ));
    let pending = Arc::new(PendingConnection::new());

    let handler = Arc::new(ConnectHandler::new(
        &identity,
        Arc::clone(&key_exchange),
        Arc::clone(&pending),
        Arc::clone(&sessions),
        Arc::clone(&emitter),
        config.read_timeout(),
    ));

    let listener = Arc::new(ZeroconfListener::from_config(
        config,
        handler,
        emitter,
        spawner.clone(),
    )?);

    Ok(BootstrappedServices {
        identity,
        key_exchange,
        pending,
        sessions,
        listener,
        event_bridge,
        network,
        spawner,
    })
}

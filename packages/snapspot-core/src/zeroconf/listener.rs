//! TCP accept loop for the zeroconf endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionTracker;
use super::handler::ConnectHandler;
use crate::error::{ConnectError, ConnectResult, ErrorCode};
use crate::events::{EventEmitter, ZeroconfEvent};
use crate::protocol_constants::MIN_LISTEN_PORT;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::utils::now_millis;

/// Accepts connections and hands each one to the [`ConnectHandler`].
pub struct ZeroconfListener {
    bind_ip: IpAddr,
    preferred_port: u16,
    socket: Mutex<Option<TcpListener>>,
    port: OnceLock<u16>,
    cancel_token: CancellationToken,
    tracker: Arc<ConnectionTracker>,
    handler: Arc<ConnectHandler>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
}

impl ZeroconfListener {
    /// Creates an unbound listener. Port 0 picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidPort`] for a privileged port.
    pub fn new(
        bind_ip: IpAddr,
        preferred_port: u16,
        handler: Arc<ConnectHandler>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> ConnectResult<Self> {
        if preferred_port != 0 && preferred_port < MIN_LISTEN_PORT {
            return Err(ConnectError::InvalidPort(preferred_port));
        }
        Ok(Self {
            bind_ip,
            preferred_port,
            socket: Mutex::new(None),
            port: OnceLock::new(),
            cancel_token: CancellationToken::new(),
            tracker: Arc::new(ConnectionTracker::new()),
            handler,
            emitter,
            spawner,
        })
    }

    /// Creates an unbound listener from the configured address and port.
    /// The socket is bound by [`Self::init_and_get_port`].
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(
        config: &Config,
        handler: Arc<ConnectHandler>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> ConnectResult<Self> {
        Self::new(
            config.bind_address,
            config.preferred_port,
            handler,
            emitter,
            spawner,
        )
    }

    /// Binds the socket if needed and returns the bound port.
    ///
    /// Later calls return the same port without rebinding.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Bind`] if the socket cannot be bound.
    pub async fn init_and_get_port(&self) -> ConnectResult<u16> {
        let mut socket = self.socket.lock().await;
        if let Some(port) = self.port.get() {
            return Ok(*port);
        }

        let addr = SocketAddr::new(self.bind_ip, self.preferred_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ConnectError::Bind { addr, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| ConnectError::Bind { addr, source })?
            .port();

        *socket = Some(listener);
        let _ = self.port.set(port);
        log::info!("[Zeroconf] Bound to {}:{}", self.bind_ip, port);
        Ok(port)
    }

    /// Bound port, if [`Self::init_and_get_port`] has succeeded.
    pub fn port(&self) -> Option<u16> {
        self.port.get().copied()
    }

    pub fn connection_count(&self) -> usize {
        self.tracker.connection_count()
    }

    /// Runs the accept loop until [`Self::shutdown`] is called.
    ///
    /// Binds first if needed. Accept errors are logged and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyRunning`] if the loop was already
    /// started, or a bind error.
    pub async fn run(&self) -> ConnectResult<()> {
        let port = self.init_and_get_port().await?;
        let listener = self
            .socket
            .lock()
            .await
            .take()
            .ok_or(ConnectError::AlreadyRunning)?;

        self.emitter.emit_zeroconf(ZeroconfEvent::Listening {
            port,
            timestamp: now_millis(),
        });

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => log::warn!("[Zeroconf] Accept failed: {}", e),
                },
            }
        }

        log::info!("[Zeroconf] Listener on port {} stopped", port);
        self.emitter.emit_zeroconf(ZeroconfEvent::Stopped {
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn dispatch(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let guard = self.tracker.register(peer);
        let handler = Arc::clone(&self.handler);

        self.spawner.spawn(async move {
            let cancel = guard.cancel_token().clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Zeroconf] Connection {} closed by shutdown", guard.id());
                }
                result = handler.handle(stream) => match result {
                    Ok(outcome) => log::debug!("[Zeroconf] {} handled: {:?}", peer, outcome),
                    Err(e) if e.is_protocol() => {
                        log::debug!("[Zeroconf] {} dropped ({}): {}", peer, e.code(), e);
                    }
                    Err(e) => log::warn!("[Zeroconf] {} failed ({}): {}", peer, e.code(), e),
                },
            }
            drop(guard);
        });
    }

    /// Stops accepting and force-closes live connections.
    pub fn shutdown(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        self.cancel_token.cancel();
        self.tracker.close_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

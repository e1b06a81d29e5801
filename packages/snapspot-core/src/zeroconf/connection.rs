//! Tracking of in-flight zeroconf connections.
//!
//! - `ConnectionTracker`: registry of live connection tasks
//! - `ConnectionGuard`: RAII guard for automatic cleanup on disconnect

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Tracks live connections and can force-close all of them.
pub struct ConnectionTracker {
    /// connection id -> peer address
    connections: DashMap<u64, SocketAddr>,
    next_id: AtomicU64,
    /// Cancelled by `close_all`; replaced so later connections still work.
    global_cancel: RwLock<CancellationToken>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a connection; it is unregistered when the guard drops.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(id, peer);
        log::debug!(
            "[Zeroconf] Connection {} from {} (active: {})",
            id,
            peer,
            self.connections.len()
        );

        ConnectionGuard {
            id,
            tracker: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            log::debug!(
                "[Zeroconf] Connection {} finished (active: {})",
                id,
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every live connection to stop. Returns how many were signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[Zeroconf] Force-closing {} connection(s)", count);
        }
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its connection when dropped.
pub struct ConnectionGuard {
    id: u64,
    tracker: Arc<ConnectionTracker>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled when the tracker force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.unregister(self.id);
    }
}

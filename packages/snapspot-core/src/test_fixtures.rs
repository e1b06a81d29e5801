//! Shared test doubles for the session collaborator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::session::{AccountAuthenticator, AuthenticationError, Session, SessionParams};

pub(crate) fn params(username: &str) -> SessionParams {
    SessionParams {
        username: username.to_string(),
        blob: b"decrypted".to_vec(),
        device_name: None,
    }
}

struct FakeSession {
    username: String,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for FakeSession {
    fn username(&self) -> &str {
        &self.username
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Authenticator that records calls and can be gated or made to fail.
pub(crate) struct FakeAuthenticator {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    fail_always: Option<String>,
    fail_next: Mutex<Option<String>>,
    panic_next: AtomicBool,
    sessions: Mutex<Vec<(String, Arc<AtomicBool>)>>,
    blobs: Mutex<Vec<Vec<u8>>>,
}

impl FakeAuthenticator {
    fn build(gate: Option<Semaphore>, fail_always: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate,
            fail_always,
            fail_next: Mutex::new(None),
            panic_next: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
            blobs: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn accepting() -> Arc<Self> {
        Self::build(None, None)
    }

    pub(crate) fn rejecting(message: &str) -> Arc<Self> {
        Self::build(None, Some(message.to_string()))
    }

    /// Each authentication waits for one permit from [`Self::release`].
    pub(crate) fn gated() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), None)
    }

    pub(crate) fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// The next authentication panics instead of returning.
    pub(crate) fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_blob(&self) -> Option<Vec<u8>> {
        self.blobs.lock().last().cloned()
    }

    pub(crate) fn session_closed_flag(&self, username: &str) -> Option<Arc<AtomicBool>> {
        self.sessions
            .lock()
            .iter()
            .find(|(name, _)| name == username)
            .map(|(_, flag)| Arc::clone(flag))
    }

    pub(crate) fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, closed)| !closed.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl AccountAuthenticator for FakeAuthenticator {
    async fn authenticate(
        &self,
        params: SessionParams,
    ) -> Result<Box<dyn Session>, AuthenticationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().push(params.blob.clone());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("authenticator crashed for {}", params.username);
        }

        if let Some(message) = self.fail_always.clone().or_else(|| self.fail_next.lock().take()) {
            return Err(AuthenticationError::new(message));
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.sessions
            .lock()
            .push((params.username.clone(), Arc::clone(&closed)));
        Ok(Box::new(FakeSession {
            username: params.username,
            closed,
        }))
    }
}

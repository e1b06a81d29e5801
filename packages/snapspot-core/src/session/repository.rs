//! Single-writer session repository.
//!
//! Only one session creation may be in progress at a time; a second
//! submission is refused until the first resolves. The active session handle
//! is owned here and never exposed; others observe it through the
//! [`SessionState`] watch channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, watch, Mutex};
use tokio_stream::wrappers::WatchStream;

use super::{AccountAuthenticator, Session, SessionError, SessionInfo, SessionParams, SessionState};
use crate::events::{EventEmitter, SessionEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::now_millis;

/// Handle to the outcome of a submitted session creation.
#[derive(Debug)]
pub struct SessionTicket {
    rx: oneshot::Receiver<SessionState>,
}

impl SessionTicket {
    /// Waits until the creation resolves to `Created` or `Error`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Aborted`] if the creation task was dropped.
    pub async fn outcome(self) -> Result<SessionState, SessionError> {
        self.rx.await.map_err(|_| SessionError::Aborted)
    }
}

/// Owns the active session and drives the creation state machine.
pub struct SessionRepository {
    authenticator: Arc<dyn AccountAuthenticator>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    state_tx: watch::Sender<SessionState>,
    /// Set while a creation is in progress.
    creating: AtomicBool,
    active: Mutex<Option<Box<dyn Session>>>,
}

/// Clears the in-progress flag when the creation task ends, even on panic.
///
/// A task that ends without publishing a result leaves `Creating` behind;
/// that is replaced with `Error` so observers are not stuck.
struct CreatingGate {
    repo: Arc<SessionRepository>,
    username: String,
}

impl Drop for CreatingGate {
    fn drop(&mut self) {
        let message = SessionError::Aborted.to_string();
        let abandoned = self.repo.state_tx.send_if_modified(|state| match state {
            SessionState::Creating { username } if *username == self.username => {
                *state = SessionState::Error {
                    message: message.clone(),
                };
                true
            }
            _ => false,
        });
        if abandoned {
            log::error!(
                "[Session] Creation for {} ended without a result",
                self.username
            );
            self.repo.emitter.emit_session(SessionEvent::Failed {
                username: self.username.clone(),
                error: message,
                timestamp: now_millis(),
            });
        }
        self.repo.creating.store(false, Ordering::SeqCst);
    }
}

impl SessionRepository {
    pub fn new(
        authenticator: Arc<dyn AccountAuthenticator>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            authenticator,
            emitter,
            spawner,
            state_tx,
            creating: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Starts creating a session from verified credentials.
    ///
    /// The state moves to `Creating` before this returns. Authentication runs
    /// on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CreationInProgress`] if another creation has
    /// not resolved yet.
    pub fn submit(self: &Arc<Self>, params: SessionParams) -> Result<SessionTicket, SessionError> {
        if self
            .creating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!(
                "[Session] Rejecting session for {}: creation already in progress",
                params.username
            );
            return Err(SessionError::CreationInProgress);
        }
        let username = params.username.clone();
        let gate = CreatingGate {
            repo: Arc::clone(self),
            username: username.clone(),
        };

        log::info!("[Session] Creating session for {}", username);
        self.state_tx.send_replace(SessionState::Creating {
            username: username.clone(),
        });
        self.emitter.emit_session(SessionEvent::Creating {
            username,
            timestamp: now_millis(),
        });

        let (tx, rx) = oneshot::channel();
        let repo = Arc::clone(self);
        self.spawner.spawn(async move {
            let outcome = repo.create(params).await;
            drop(gate);
            // The submitter may have stopped waiting.
            let _ = tx.send(outcome);
        });

        Ok(SessionTicket { rx })
    }

    /// Submits and waits for the creation to resolve.
    ///
    /// # Errors
    ///
    /// See [`SessionRepository::submit`] and [`SessionTicket::outcome`].
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        params: SessionParams,
    ) -> Result<SessionState, SessionError> {
        self.submit(params)?.outcome().await
    }

    async fn create(&self, params: SessionParams) -> SessionState {
        let username = params.username.clone();
        let result = self.authenticator.authenticate(params).await;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.close_session(previous).await;
        }

        let state = match result {
            Ok(session) => {
                let info = SessionInfo {
                    username: session.username().to_string(),
                    created_at: now_millis(),
                };
                *active = Some(session);
                log::info!("[Session] Session created for {}", info.username);
                self.emitter.emit_session(SessionEvent::Created {
                    username: info.username.clone(),
                    timestamp: info.created_at,
                });
                SessionState::Created(info)
            }
            Err(e) => {
                log::warn!("[Session] Session creation failed for {}: {}", username, e);
                self.emitter.emit_session(SessionEvent::Failed {
                    username,
                    error: e.message.clone(),
                    timestamp: now_millis(),
                });
                SessionState::Error { message: e.message }
            }
        };

        self.state_tx.send_replace(state.clone());
        state
    }

    async fn close_session(&self, mut session: Box<dyn Session>) {
        let username = session.username().to_string();
        session.close().await;
        log::info!("[Session] Closed session for {}", username);
        self.emitter.emit_session(SessionEvent::Closed {
            username,
            timestamp: now_millis(),
        });
    }

    /// Closes the active session, if any, and returns to `Idle`.
    ///
    /// A creation in progress is left to resolve on its own.
    ///
    /// Returns `true` if a session was closed.
    pub async fn close(&self) -> bool {
        let mut active = self.active.lock().await;
        let closed = match active.take() {
            Some(session) => {
                self.close_session(session).await;
                true
            }
            None => false,
        };

        self.state_tx.send_if_modified(|state| {
            if state.is_creating() || *state == SessionState::Idle {
                false
            } else {
                *state = SessionState::Idle;
                true
            }
        });
        closed
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Returns the state as a stream, starting with the current value.
    pub fn stream(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.subscribe())
    }

    /// Username of the session being created or currently active.
    pub fn active_username(&self) -> Option<String> {
        self.state_tx.borrow().username().map(str::to_string)
    }

    /// Whether a creation is in progress.
    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::test_fixtures::{params, FakeAuthenticator};
    use futures::StreamExt;
    use std::time::Duration;

    fn repository(auth: Arc<FakeAuthenticator>) -> Arc<SessionRepository> {
        Arc::new(SessionRepository::new(
            auth,
            Arc::new(NoopEventEmitter),
            TokioSpawner::current(),
        ))
    }

    #[tokio::test]
    async fn successful_creation_reaches_created() {
        let auth = FakeAuthenticator::accepting();
        let repo = repository(auth.clone());

        let state = repo.submit_and_wait(params("alice")).await.unwrap();

        match state {
            SessionState::Created(info) => assert_eq!(info.username, "alice"),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(repo.active_username().as_deref(), Some("alice"));
        assert_eq!(auth.calls(), 1);
        assert!(!repo.is_creating());
    }

    #[tokio::test]
    async fn failed_creation_reaches_error() {
        let auth = FakeAuthenticator::rejecting("bad credentials");
        let repo = repository(auth);

        let state = repo.submit_and_wait(params("alice")).await.unwrap();

        assert_eq!(
            state,
            SessionState::Error {
                message: "bad credentials".into()
            }
        );
        assert_eq!(repo.active_username(), None);
    }

    #[tokio::test]
    async fn state_is_creating_while_authenticating() {
        let auth = FakeAuthenticator::gated();
        let repo = repository(auth.clone());

        let ticket = repo.submit(params("alice")).unwrap();
        assert_eq!(
            repo.state(),
            SessionState::Creating {
                username: "alice".into()
            }
        );

        auth.release(1);
        let state = ticket.outcome().await.unwrap();
        assert!(matches!(state, SessionState::Created(_)));
    }

    #[tokio::test]
    async fn second_submission_is_rejected_while_creating() {
        let auth = FakeAuthenticator::gated();
        let repo = repository(auth.clone());

        let ticket = repo.submit(params("alice")).unwrap();
        let err = repo.submit(params("bob")).unwrap_err();
        assert_eq!(err, SessionError::CreationInProgress);

        auth.release(1);
        ticket.outcome().await.unwrap();
        assert_eq!(auth.calls(), 1);

        auth.release(1);
        let state = repo.submit_and_wait(params("bob")).await.unwrap();
        assert!(matches!(state, SessionState::Created(ref info) if info.username == "bob"));
    }

    #[tokio::test]
    async fn previous_session_closed_before_replacement_is_visible() {
        let auth = FakeAuthenticator::accepting();
        let repo = repository(auth.clone());

        repo.submit_and_wait(params("alice")).await.unwrap();
        let alice_closed = auth.session_closed_flag("alice").unwrap();

        let mut rx = repo.subscribe();
        let ticket = repo.submit(params("bob")).unwrap();

        loop {
            rx.changed().await.unwrap();
            let state = rx.borrow_and_update().clone();
            if let SessionState::Created(info) = state {
                assert_eq!(info.username, "bob");
                assert!(alice_closed.load(Ordering::SeqCst));
                break;
            }
        }
        ticket.outcome().await.unwrap();
        assert_eq!(auth.open_sessions(), 1);
    }

    #[tokio::test]
    async fn failure_closes_previous_session() {
        let auth = FakeAuthenticator::accepting();
        let repo = repository(auth.clone());

        repo.submit_and_wait(params("alice")).await.unwrap();
        auth.fail_next("expired");

        let state = repo.submit_and_wait(params("bob")).await.unwrap();
        assert!(matches!(state, SessionState::Error { .. }));
        assert_eq!(auth.open_sessions(), 0);
    }

    #[tokio::test]
    async fn panicking_authenticator_leaves_error_state() {
        let auth = FakeAuthenticator::accepting();
        let repo = repository(auth.clone());
        let mut rx = repo.subscribe();

        auth.panic_next();
        let outcome = repo.submit_and_wait(params("alice")).await;
        assert_eq!(outcome, Err(SessionError::Aborted));

        let state = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|s| matches!(s, SessionState::Error { .. })),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(
            state,
            SessionState::Error {
                message: SessionError::Aborted.to_string()
            }
        );
        assert!(!repo.is_creating());

        let state = repo.submit_and_wait(params("alice")).await.unwrap();
        assert!(matches!(state, SessionState::Created(_)));
    }

    #[tokio::test]
    async fn close_returns_to_idle() {
        let auth = FakeAuthenticator::accepting();
        let repo = repository(auth.clone());

        repo.submit_and_wait(params("alice")).await.unwrap();
        assert!(repo.close().await);
        assert_eq!(repo.state(), SessionState::Idle);
        assert_eq!(auth.open_sessions(), 0);
        assert!(!repo.close().await);
    }

    #[tokio::test]
    async fn stream_yields_transitions() {
        let auth = FakeAuthenticator::gated();
        let repo = repository(auth.clone());
        let mut stream = repo.stream();

        assert_eq!(stream.next().await, Some(SessionState::Idle));

        let ticket = repo.submit(params("alice")).unwrap();
        assert_eq!(
            stream.next().await,
            Some(SessionState::Creating {
                username: "alice".into()
            })
        );

        auth.release(1);
        ticket.outcome().await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(matches!(next, Some(SessionState::Created(_))));
    }
}

//! Session lifecycle for authenticated Connect accounts.
//!
//! The handshake handler hands verified credentials to the
//! [`SessionRepository`], which turns them into a live [`Session`] through an
//! [`AccountAuthenticator`] and publishes [`SessionState`] to subscribers.
//!
//! ```text
//! Idle ──submit──▶ Creating ──ok──▶ Created
//!                     │               │
//!                     └──err──▶ Error ◀┘ (next submit goes back to Creating)
//! ```

mod repository;

pub use repository::{SessionRepository, SessionTicket};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Credentials recovered from a verified `addUser` request.
#[derive(Clone)]
pub struct SessionParams {
    pub username: String,
    /// Decrypted credential blob.
    pub blob: Vec<u8>,
    /// Name of the submitting client device, if provided.
    pub device_name: Option<String>,
}

impl std::fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParams")
            .field("username", &self.username)
            .field("blob_len", &self.blob.len())
            .field("device_name", &self.device_name)
            .finish()
    }
}

/// Public description of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub username: String,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Creating {
        username: String,
    },
    Created(SessionInfo),
    Error {
        message: String,
    },
}

impl SessionState {
    /// Username of the session being created or currently active.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Creating { username } => Some(username),
            Self::Created(info) => Some(&info.username),
            Self::Idle | Self::Error { .. } => None,
        }
    }

    pub fn is_creating(&self) -> bool {
        matches!(self, Self::Creating { .. })
    }
}

/// Errors refusing a session submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another session is being created; only one may be in progress.
    #[error("Another session creation is already in progress")]
    CreationInProgress,

    /// The creation task ended without reporting a result.
    #[error("Session creation was aborted")]
    Aborted,
}

/// Failure reported by the account authenticator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthenticationError {
    pub message: String,
}

impl AuthenticationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A live authenticated account context.
#[async_trait]
pub trait Session: Send + Sync {
    fn username(&self) -> &str;

    /// Releases the session. Called exactly once, before a replacement
    /// becomes visible.
    async fn close(&mut self);
}

/// Turns decrypted credentials into a [`Session`].
///
/// This is the account-authentication collaborator; it may perform network
/// I/O and is awaited without any repository lock held.
#[async_trait]
pub trait AccountAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        params: SessionParams,
    ) -> Result<Box<dyn Session>, AuthenticationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_username_tracks_creating_and_created() {
        assert_eq!(SessionState::Idle.username(), None);
        assert_eq!(
            SessionState::Creating {
                username: "a".into()
            }
            .username(),
            Some("a")
        );
        assert_eq!(
            SessionState::Created(SessionInfo {
                username: "b".into(),
                created_at: 0
            })
            .username(),
            Some("b")
        );
        assert_eq!(
            SessionState::Error {
                message: "x".into()
            }
            .username(),
            None
        );
    }

    #[test]
    fn params_debug_hides_blob() {
        let params = SessionParams {
            username: "alice".into(),
            blob: b"secret".to_vec(),
            device_name: None,
        };
        let printed = format!("{:?}", params);
        assert!(printed.contains("blob_len: 6"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(SessionState::Creating {
            username: "alice".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "creating");
        assert_eq!(json["username"], "alice");
    }
}

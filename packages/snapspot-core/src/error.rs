//! Centralized error types for the Snapspot core library.
//!
//! Each module defines its own `thiserror` enum; [`ConnectError`] aggregates
//! them and decides how a failure surfaces on the wire:
//!
//! | Kind          | Source                                | Outcome                 |
//! |---------------|---------------------------------------|-------------------------|
//! | Protocol      | [`RequestError`], missing parameters  | silent connection abort |
//! | Auth          | [`BlobError`], bad base64             | `400 Bad Request`       |
//! | Conflict      | [`PendingError`]                      | `403 Forbidden`         |
//! | Crypto init   | [`CryptoError`]                       | `500`                   |
//! | Fatal         | bind failure                          | startup aborts          |

use std::net::SocketAddr;

use thiserror::Error;

use crate::crypto::{BlobError, CryptoError};
use crate::identity::IdentityError;
use crate::zeroconf::pending::PendingError;
use crate::zeroconf::request::RequestError;
use crate::zeroconf::response::Status;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for logs and events.
    fn code(&self) -> &'static str;
}

impl ErrorCode for RequestError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConnectionClosed => "connection_closed",
            Self::MalformedRequestLine(_) => "malformed_request_line",
            Self::HeadersTooLarge => "headers_too_large",
            Self::UnsupportedContentType(_) => "unsupported_content_type",
            Self::MissingContentLength => "missing_content_length",
            Self::InvalidContentLength(_) => "invalid_content_length",
            Self::BodyTooLarge(_) => "body_too_large",
            Self::Timeout => "read_timeout",
            Self::Io(_) => "io_error",
        }
    }
}

impl ErrorCode for BlobError {
    fn code(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "blob_too_short",
            Self::MacMismatch => "blob_mac_mismatch",
            Self::Crypto(e) => e.code(),
        }
    }
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPublicKey => "invalid_public_key",
            Self::CipherInit(_) => "cipher_init_failed",
        }
    }
}

/// Application-wide error type for the zeroconf endpoint.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The request could not be parsed.
    #[error("Protocol error: {0}")]
    Request(#[from] RequestError),

    /// A required request parameter is missing.
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// A base64 parameter could not be decoded.
    #[error("Invalid base64 in {param}: {message}")]
    InvalidBase64 {
        param: &'static str,
        message: String,
    },

    /// The submitted blob failed verification or decryption.
    #[error("Credential blob rejected: {0}")]
    Blob(#[from] BlobError),

    /// The same user already has a credential submission in flight.
    #[error(transparent)]
    Conflict(#[from] PendingError),

    /// Writing the response failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to bind the listener socket. Fatal for the subsystem.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A configured port lies outside the unprivileged range.
    #[error("Invalid listen port {0} (must be 0 or >= 1024)")]
    InvalidPort(u16),

    /// The listener accept loop is already running.
    #[error("Listener already running")]
    AlreadyRunning,

    /// Device identity could not be loaded or persisted.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<CryptoError> for ConnectError {
    fn from(err: CryptoError) -> Self {
        Self::Blob(BlobError::Crypto(err))
    }
}

impl ConnectError {
    /// Returns the response status to send, or `None` for a silent abort.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::InvalidBase64 { .. } => Some(Status::BadRequest),
            Self::Blob(BlobError::Crypto(_)) => Some(Status::InternalServerError),
            Self::Blob(_) => Some(Status::BadRequest),
            Self::Conflict(_) => Some(Status::Forbidden),
            _ => None,
        }
    }

    /// Whether this error is routine protocol noise rather than a fault.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Request(_) | Self::MissingParameter(_))
    }
}

impl ErrorCode for ConnectError {
    fn code(&self) -> &'static str {
        match self {
            Self::Request(e) => e.code(),
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidBase64 { .. } => "invalid_base64",
            Self::Blob(e) => e.code(),
            Self::Conflict(_) => "user_in_flight",
            Self::Io(_) => "io_error",
            Self::Bind { .. } => "bind_failed",
            Self::InvalidPort(_) => "invalid_port",
            Self::AlreadyRunning => "already_running",
            Self::Identity(_) => "identity_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type ConnectResult<T> = Result<T, ConnectError>;

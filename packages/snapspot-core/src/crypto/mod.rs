//! Cryptographic primitives for the zeroconf handshake.
//!
//! - [`dh`]: Diffie-Hellman key exchange over the Oakley 768-bit group
//! - [`blob`]: Key derivation and credential blob verification/decryption

pub mod blob;
pub mod dh;

pub use blob::{BlobError, BlobKeys, CredentialDecryptor};
pub use dh::KeyExchange;

use thiserror::Error;

/// Errors raised while setting up handshake cryptography.
///
/// These indicate a broken peer key or cipher setup rather than a forged blob,
/// and are reported to the client as an internal error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The peer public key is empty or outside the valid range `(1, p-1)`.
    #[error("Invalid peer public key")]
    InvalidPublicKey,

    /// A MAC or cipher could not be initialized with the derived key material.
    #[error("Cipher initialization failed: {0}")]
    CipherInit(String),
}

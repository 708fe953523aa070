//! Sealed envelopes for delivering derived keys.
//!
//! A [`DerivedKey`] travels from the authority to its requester inside an
//! [`Envelope`]: the key is encrypted under a one-time X25519 agreement with
//! the requester's identity key and authenticated with ChaCha20-Poly1305.
//!
//! ## Wire layout
//!
//! ```text
//! scheme (1) || ephemeral_public (32) || nonce (12) || ciphertext (..)
//! ```
//!
//! The 45-byte header is passed as associated data, so altering any byte of
//! the envelope makes [`SecureEnvelope::open`] fail.

use zeroize::Zeroizing;

use attrgate_core::{IdentityKey, IdentityKeypair};

use crate::authority::DerivedKey;
use crate::crypto::{EncryptionNonce, EphemeralKeyPair, SharedKey};
use crate::error::{PermsError, Result};

/// Length of the envelope header in bytes.
pub const HEADER_LEN: usize = 1 + 32 + 12;

/// Poly1305 tag length; the smallest possible ciphertext.
const TAG_LEN: usize = 16;

/// Scheme identifier carried in the first envelope byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeScheme {
    /// Ephemeral X25519, Blake3 key derivation, ChaCha20-Poly1305.
    X25519ChaCha20Poly1305 = 1,
}

impl EnvelopeScheme {
    /// Convert from the wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::X25519ChaCha20Poly1305),
            _ => None,
        }
    }
}

/// An encrypted derived key addressed to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Encryption scheme used.
    pub scheme: EnvelopeScheme,

    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: IdentityKey,

    /// Nonce used for encryption.
    pub nonce: EncryptionNonce,

    /// The encrypted key (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// The header bytes, authenticated as associated data.
    pub fn header(&self) -> [u8; HEADER_LEN] {
        header_bytes(self.scheme, &self.ephemeral_public, &self.nonce)
    }

    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.header());
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// Parse the wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + TAG_LEN {
            return Err(PermsError::MalformedEnvelope(format!(
                "expected at least {} bytes, got {}",
                HEADER_LEN + TAG_LEN,
                bytes.len()
            )));
        }

        let scheme = EnvelopeScheme::from_u8(bytes[0]).ok_or_else(|| {
            PermsError::MalformedEnvelope(format!("unknown scheme {}", bytes[0]))
        })?;

        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&bytes[1..33]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[33..HEADER_LEN]);

        Ok(Self {
            scheme,
            ephemeral_public: IdentityKey::from_bytes(ephemeral),
            nonce: EncryptionNonce::from_bytes(nonce),
            ciphertext: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Hex form used when the envelope is stored as text.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse the hex form, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| PermsError::MalformedEnvelope(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

fn header_bytes(
    scheme: EnvelopeScheme,
    ephemeral_public: &IdentityKey,
    nonce: &EncryptionNonce,
) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = scheme as u8;
    header[1..33].copy_from_slice(ephemeral_public.as_bytes());
    header[33..].copy_from_slice(nonce.as_bytes());
    header
}

/// Wrapping-key context: both public keys of the agreement.
fn wrap_context(ephemeral_public: &IdentityKey, recipient: &IdentityKey) -> [u8; 64] {
    let mut context = [0u8; 64];
    context[..32].copy_from_slice(ephemeral_public.as_bytes());
    context[32..].copy_from_slice(recipient.as_bytes());
    context
}

/// Seals and opens derived keys for a recipient identity.
pub struct SecureEnvelope;

impl SecureEnvelope {
    /// Encrypt `key` so that only the holder of `recipient`'s private key can
    /// open it.
    pub fn seal(key: &DerivedKey, recipient: &IdentityKey) -> Result<Envelope> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral
            .diffie_hellman(recipient)
            .derive_encryption_key(&wrap_context(&ephemeral_public, recipient));

        let scheme = EnvelopeScheme::X25519ChaCha20Poly1305;
        let nonce = EncryptionNonce::generate();
        let header = header_bytes(scheme, &ephemeral_public, &nonce);

        let plaintext = Zeroizing::new(key.to_bytes()?);
        let ciphertext = wrap_key.encrypt(&plaintext, &header, &nonce)?;

        Ok(Envelope {
            scheme,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt an envelope with the recipient's key pair.
    ///
    /// Fails with [`PermsError::DecryptionFailed`] whether the key is wrong
    /// or the envelope was altered.
    pub fn open(envelope: &Envelope, recipient: &IdentityKeypair) -> Result<DerivedKey> {
        match envelope.scheme {
            EnvelopeScheme::X25519ChaCha20Poly1305 => {
                let shared =
                    SharedKey::from_bytes(recipient.diffie_hellman(&envelope.ephemeral_public));
                let wrap_key = shared.derive_encryption_key(&wrap_context(
                    &envelope.ephemeral_public,
                    &recipient.public_key(),
                ));

                let plaintext = Zeroizing::new(wrap_key.decrypt(
                    &envelope.ciphertext,
                    &envelope.header(),
                    &envelope.nonce,
                )?);

                DerivedKey::from_bytes(&plaintext).map_err(|_| PermsError::DecryptionFailed)
            }
        }
    }

    /// Parse and open serialized envelope bytes.
    ///
    /// Malformed bytes fail the same way as a failed decryption.
    pub fn open_bytes(bytes: &[u8], recipient: &IdentityKeypair) -> Result<DerivedKey> {
        let envelope = Envelope::from_bytes(bytes).map_err(|_| PermsError::DecryptionFailed)?;
        Self::open(&envelope, recipient)
    }
}

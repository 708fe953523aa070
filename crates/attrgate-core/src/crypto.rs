//! Cryptographic identities for attrgate.
//!
//! Requesters, devices and the registry owner are addressed by X25519 public
//! keys. The key authority publishes an Ed25519 verifying key that devices use
//! to check the attribute binding of issued keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CoreError;

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

fn decode_hex_32(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
    bytes
        .try_into()
        .map_err(|_| hex::FromHexError::InvalidStringLength)
}

/// The public half of an identity: a 32-byte X25519 public key.
///
/// Used as the address of requesters, devices and the owner.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey(pub [u8; 32]);

impl IdentityKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_hex_32(s).map(Self)
    }

    /// Short form for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..16].to_string()
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<PublicKey> for IdentityKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl AsRef<[u8]> for IdentityKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An identity key pair. The private half never leaves its holder.
#[derive(Clone)]
pub struct IdentityKeypair {
    secret: StaticSecret,
    public: IdentityKey,
}

impl IdentityKeypair {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(seed))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = IdentityKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public identity key.
    pub fn public_key(&self) -> IdentityKey {
        self.public
    }

    /// Perform X25519 key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer: &IdentityKey) -> [u8; 32] {
        *self.secret.diffie_hellman(&peer.to_dalek()).as_bytes()
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKeypair({:?})", self.public)
    }
}

/// The key authority's public verifying key (Ed25519).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorityKey(pub [u8; 32]);

impl AuthorityKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_hex_32(s).map(Self)
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &AuthoritySignature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;

        verifying_key
            .verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for AuthorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorityKey({})", &self.to_hex()[..16])
    }
}

/// A 64-byte Ed25519 signature made by the key authority.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuthoritySignature(pub [u8; 64]);

impl AuthoritySignature {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for AuthoritySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthoritySig({}...)", hex::encode(&self.0[..8]))
    }
}

// serde only derives for arrays up to 32 elements.
impl Serialize for AuthoritySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuthoritySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(Self(arr))
    }
}

/// The authority's signing key pair, derived from its master secret.
#[derive(Clone)]
pub struct AuthorityKeypair {
    signing_key: SigningKey,
}

impl AuthorityKeypair {
    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Get the public verifying key.
    pub fn public_key(&self) -> AuthorityKey {
        AuthorityKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> AuthoritySignature {
        AuthoritySignature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for AuthorityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorityKeypair({:?})", self.public_key())
    }
}

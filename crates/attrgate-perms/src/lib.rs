//! # attrgate perms
//!
//! Attribute key issuance and confidential key delivery.
//!
//! ## Overview
//!
//! The owner runs a [`KeyAuthority`]. For every granted request it derives a
//! [`DerivedKey`] bound to the requester's identity and attribute set, seals
//! it with [`SecureEnvelope`] under the requester's public identity key, and
//! hands the resulting [`Envelope`] to the registry. Only the requester can
//! open it.
//!
//! ## Encryption Model
//!
//! 1. **Derivation**: keyed Blake3 over (identity, attributes, blinding),
//!    certified by the authority's Ed25519 signature
//! 2. **Delivery**: ephemeral X25519 agreement with the recipient, Blake3
//!    key derivation, ChaCha20-Poly1305 with the envelope header as
//!    associated data
//! 3. **Payloads**: data a device seals to the holder of a derived key; see
//!    [`SealedPayload`]
//!
//! ## Usage
//!
//! ```rust
//! use attrgate_core::{AttributeSet, IdentityKeypair};
//! use attrgate_perms::{KeyAuthority, SecureEnvelope};
//!
//! let authority = KeyAuthority::new();
//! authority.initialize([7u8; 32]).unwrap();
//!
//! let requester = IdentityKeypair::generate();
//! let attrs = AttributeSet::new(["admin", "it_departement"]).unwrap();
//! let key = authority.derive_key(&requester.public_key(), &attrs).unwrap();
//!
//! let envelope = SecureEnvelope::seal(&key, &requester.public_key()).unwrap();
//! let opened = SecureEnvelope::open(&envelope, &requester).unwrap();
//! assert_eq!(opened.attributes(), &attrs);
//! ```

pub mod authority;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod payload;

pub use authority::{DerivedKey, KeyAuthority, MasterSecret};
pub use crypto::{EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey};
pub use envelope::{Envelope, EnvelopeScheme, SecureEnvelope, HEADER_LEN};
pub use error::{PermsError, Result};
pub use payload::{SealedPayload, PAYLOAD_VERSION};

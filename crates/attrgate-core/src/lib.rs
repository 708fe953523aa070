//! # attrgate core
//!
//! Pure primitives shared by every attrgate crate: identity keys, the
//! authority's verifying key, attribute sets and timestamps.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`IdentityKey`] / [`IdentityKeypair`] - X25519 identities used as addresses
//! - [`AuthorityKey`] - Ed25519 key that certifies issued attribute keys
//! - [`AttributeSet`] - Sorted, deduplicated set of attribute tokens
//! - [`Timestamp`] - The `now` a device policy is evaluated at

pub mod attributes;
pub mod crypto;
pub mod error;
pub mod time;

pub use attributes::{
    validate_token, AttributeSet, MAX_ATTRIBUTES, MAX_ATTRIBUTE_LEN, RESERVED_TOKENS,
};
pub use crypto::{
    AuthorityKey, AuthorityKeypair, AuthoritySignature, Blake3Hash, IdentityKey, IdentityKeypair,
};
pub use error::{CoreError, Result};
pub use time::Timestamp;

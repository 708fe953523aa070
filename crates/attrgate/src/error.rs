//! Error types for the gate facade.

use attrgate_core::{CoreError, IdentityKey};
use attrgate_perms::PermsError;
use attrgate_policy::PolicyParseError;
use attrgate_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur during gate operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// Malformed identity, attribute or signature.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Key authority or envelope error.
    #[error("key error: {0}")]
    Perms(#[from] PermsError),

    /// Policy text did not parse.
    #[error(transparent)]
    Policy(#[from] PolicyParseError),

    /// Registry backend error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The registry is owned by someone else or certifies another authority.
    #[error("registry mismatch: {0}")]
    RegistryMismatch(String),

    /// The requester holds no grant.
    #[error("no grant recorded for {0}")]
    NoGrant(IdentityKey),

    /// The opened key was issued to a different identity.
    #[error("key was issued to {issued}, not {expected}")]
    IdentityMismatch {
        issued: IdentityKey,
        expected: IdentityKey,
    },

    /// The opened key's attributes differ from the registry's record.
    #[error("key attributes do not match the registry record")]
    AttributesMismatch,

    /// The device's policy does not admit the presented key.
    #[error("device {device} does not admit the presented key")]
    NotAdmitted { device: IdentityKey },

    #[error("too many attributes: {count} (max {max})")]
    TooManyAttributes { count: usize, max: usize },

    #[error("policy too long: {len} bytes (max {max})")]
    PolicyTooLong { len: usize, max: usize },

    /// Owner key file or configuration problem.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

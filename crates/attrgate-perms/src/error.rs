//! Error types for key issuance and delivery.

use thiserror::Error;

/// Errors that can occur in the key authority or the secure envelope.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The authority already holds a master secret.
    #[error("key authority is already initialized")]
    AlreadyInitialized,

    /// The authority has no master secret yet.
    #[error("key authority is not initialized")]
    NotInitialized,

    /// The attribute set cannot back a grant.
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    /// An issued key does not match the authority's binding.
    #[error("derived key binding does not verify")]
    BindingMismatch,

    /// Opening an envelope failed.
    ///
    /// Deliberately carries no cause: a wrong key and a tampered payload
    /// look the same to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Envelope bytes are not in the expected layout.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error (e.g. an invalid attribute token).
    #[error(transparent)]
    Core(#[from] attrgate_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;

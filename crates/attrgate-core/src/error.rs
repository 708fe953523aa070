//! Error types for attrgate core primitives.

use thiserror::Error;

/// Errors raised while constructing or decoding core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// An attribute token is empty, too long, or contains a disallowed character.
    #[error("invalid attribute token {token:?}: {reason}")]
    InvalidAttributeToken { token: String, reason: &'static str },

    #[error("attribute set holds more than {max} names")]
    TooManyAttributes { max: usize },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

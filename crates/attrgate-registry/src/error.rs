//! Error types for the registry.

use attrgate_core::IdentityKey;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An owner-only mutation was attempted by someone else.
    #[error("caller {caller} is not owner")]
    NotOwner { caller: IdentityKey },

    /// The requester already holds a grant.
    #[error("access already granted to {0}")]
    AlreadyGranted(IdentityKey),

    /// Nothing to revoke for this requester.
    #[error("no request or grant recorded for {0}")]
    NoSuchGrant(IdentityKey),

    /// Grants must carry at least one attribute.
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding registry state was poisoned by a panicking writer.
    #[error("registry state lock poisoned")]
    Poisoned,

    /// Blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

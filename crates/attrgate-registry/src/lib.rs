//! # attrgate registry
//!
//! The shared record of access requests, grants and device policies,
//! behind the [`Registry`] trait, with SQLite and in-memory backends.
//!
//! ## Key Types
//!
//! - [`Registry`] - The async trait every backend implements
//! - [`SqliteRegistry`] - SQLite-based persistent registry
//! - [`MemoryRegistry`] - In-memory registry for tests and embedding
//! - [`GrantRecord`] - Where one requester stands
//! - [`RegistryEvent`] - Notifications of successful mutations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attrgate_core::IdentityKeypair;
//! use attrgate_perms::KeyAuthority;
//! use attrgate_registry::{Registry, RequestOutcome, SqliteRegistry};
//!
//! async fn example() {
//!     let authority = KeyAuthority::new();
//!     authority.initialize([7u8; 32]).unwrap();
//!     let owner = IdentityKeypair::generate();
//!
//!     let registry = SqliteRegistry::open(
//!         "registry.db",
//!         owner.public_key(),
//!         authority.public_key().unwrap(),
//!     )
//!     .unwrap();
//!
//!     let requester = IdentityKeypair::generate();
//!     let outcome = registry.request_access(&requester.public_key()).await.unwrap();
//!     assert_eq!(outcome, RequestOutcome::Requested);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Owner gate**: grants, revocations and policy changes require the owner
//! - **No double grant**: granting a requester twice fails with `AlreadyGranted`
//! - **Events**: emitted once per successful mutation, never on failure

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use sqlite::SqliteRegistry;
pub use traits::{GrantRecord, GrantStatus, Registry, RegistryEvent, RequestOutcome};

//! # attrgate
//!
//! Attribute-based access control: an owner-run key authority, sealed key
//! delivery through a shared registry, and device-side admission policies.
//!
//! ## Overview
//!
//! - **Owner**: runs a [`Gate`], which derives a key bound to each
//!   requester's identity and granted attributes, seals it to the requester
//!   and records it in the [`Registry`](registry::Registry)
//! - **Requester**: asks for access, then opens its grant with
//!   [`recover_grant`]
//! - **Device**: holds a policy such as `admin AND date > 15434456322`,
//!   admits presented attributes or keys through a [`DeviceGuard`] and seals
//!   its data to admitted key holders, who read it with [`open_payload`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attrgate::{DeviceGuard, Gate, GateConfig};
//! use attrgate::core::{AttributeSet, IdentityKeypair, Timestamp};
//! use attrgate::perms::MasterSecret;
//! use attrgate::registry::{MemoryRegistry, Registry};
//!
//! async fn example() {
//!     let owner = IdentityKeypair::generate();
//!     let seed = [7u8; 32];
//!     let registry = MemoryRegistry::new(
//!         owner.public_key(),
//!         MasterSecret::from_seed(seed).public_key(),
//!     );
//!     let gate = Gate::bootstrap(owner.public_key(), seed, registry, GateConfig::default())
//!         .unwrap();
//!
//!     // Requester asks, owner grants.
//!     let requester = IdentityKeypair::generate();
//!     gate.registry().request_access(&requester.public_key()).await.unwrap();
//!     let attrs = AttributeSet::new(["admin", "it_departement"]).unwrap();
//!     gate.grant(&requester.public_key(), &attrs).await.unwrap();
//!
//!     // Requester recovers its key.
//!     let key = Gate::recover_grant(gate.registry(), &requester).await.unwrap();
//!
//!     // A device admits the key under its policy.
//!     let device = IdentityKeypair::generate().public_key();
//!     gate.set_device_policy(&device, "(admin AND date > 15434456322)").await.unwrap();
//!     let mut guard = DeviceGuard::new(device, gate.authority_key());
//!     guard.refresh(gate.registry()).await.unwrap();
//!     assert!(guard.admit_key(&key, Timestamp::now()).unwrap());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `attrgate::core` - Identities, attribute sets, timestamps
//! - `attrgate::perms` - Key authority and sealed envelopes
//! - `attrgate::policy` - Policy language and evaluator
//! - `attrgate::registry` - Registry trait and backends

pub mod config;
pub mod device;
pub mod error;
pub mod gate;

// Re-export component crates
pub use attrgate_core as core;
pub use attrgate_perms as perms;
pub use attrgate_policy as policy;
pub use attrgate_registry as registry;

// Re-export main types for convenience
pub use config::{GateConfig, OwnerKeys};
pub use device::{open_payload, DeviceGuard};
pub use error::{GateError, Result};
pub use gate::{recover_grant, Gate};

pub use attrgate_core::{AttributeSet, IdentityKey, IdentityKeypair, Timestamp};
pub use attrgate_perms::{DerivedKey, Envelope, KeyAuthority, SealedPayload, SecureEnvelope};
pub use attrgate_policy::{evaluate, PolicyExpression, PolicyParseError};

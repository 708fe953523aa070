//! # attrgate testkit
//!
//! Testing utilities for attrgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Policy texts with their canonical form and expected decision
//! - **Generators**: Proptest strategies for identities, attribute sets and policies
//! - **Fixtures**: An owner, an authority and a registry wired together
//!
//! ## Golden Vectors
//!
//! ```rust
//! use attrgate_testkit::vectors::verify_all_vectors;
//!
//! for result in verify_all_vectors() {
//!     assert!(result.passed, "{}: {}", result.name, result.detail);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use attrgate_testkit::generators::{attribute_set, policy, timestamp};
//!
//! proptest! {
//!     #[test]
//!     fn evaluation_is_pure(expr in policy(), set in attribute_set(), now in timestamp()) {
//!         prop_assert_eq!(expr.evaluate(&set, now), expr.evaluate(&set, now));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use attrgate_core::IdentityKeypair;
//! use attrgate_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let requester = IdentityKeypair::generate();
//! let (key, envelope) = fixture.sealed_key(&requester.public_key(), &["admin"]);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{attributes, parties, TestFixture, DEFAULT_MASTER_SEED};
pub use generators::{attribute_set, identity_keypair, policy, policy_text};
pub use vectors::{all_vectors, check_vector, verify_all_vectors, GoldenVector, VectorResult};

//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey, IdentityKeypair};
use attrgate_perms::{DerivedKey, Envelope, KeyAuthority, MasterSecret, SecureEnvelope};
use attrgate_registry::MemoryRegistry;

/// Master seed used when a test does not care which authority it gets.
pub const DEFAULT_MASTER_SEED: [u8; 32] = [0x5e; 32];

/// An owner identity and the seed of its authority.
pub struct TestFixture {
    pub owner: IdentityKeypair,
    pub master_seed: [u8; 32],
}

impl TestFixture {
    /// Create a fixture with a random owner and the default master seed.
    pub fn new() -> Self {
        Self {
            owner: IdentityKeypair::generate(),
            master_seed: DEFAULT_MASTER_SEED,
        }
    }

    /// Create with deterministic owner and master seeds.
    pub fn with_seeds(owner_seed: [u8; 32], master_seed: [u8; 32]) -> Self {
        Self {
            owner: IdentityKeypair::from_seed(owner_seed),
            master_seed,
        }
    }

    pub fn owner_key(&self) -> IdentityKey {
        self.owner.public_key()
    }

    pub fn authority_key(&self) -> AuthorityKey {
        MasterSecret::from_seed(self.master_seed).public_key()
    }

    /// An initialized authority over the fixture's master seed.
    pub fn authority(&self) -> KeyAuthority {
        KeyAuthority::with_master(MasterSecret::from_seed(self.master_seed))
    }

    /// A fresh in-memory registry owned by the fixture's owner.
    pub fn memory_registry(&self) -> MemoryRegistry {
        MemoryRegistry::new(self.owner_key(), self.authority_key())
    }

    /// Derive a key for `requester` and seal it to them.
    pub fn sealed_key(&self, requester: &IdentityKey, names: &[&str]) -> (DerivedKey, Envelope) {
        let key = self
            .authority()
            .derive_key(requester, &attributes(names))
            .expect("fixture authority derives");
        let envelope = SecureEnvelope::seal(&key, requester).expect("fixture seal");
        (key, envelope)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an attribute set from literal names.
pub fn attributes(names: &[&str]) -> AttributeSet {
    AttributeSet::new(names.iter().copied()).expect("fixture attribute names are valid")
}

/// Create distinct deterministic identities for multi-party tests.
pub fn parties(count: usize) -> Vec<IdentityKeypair> {
    (0..count)
        .map(|i| {
            // X25519 clamping rewrites bits of bytes 0 and 31.
            let mut seed = [0xa0u8; 32];
            seed[8..16].copy_from_slice(&(i as u64).to_le_bytes());
            IdentityKeypair::from_seed(seed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrgate_registry::Registry;

    #[test]
    fn test_sealed_key_opens_for_requester() {
        let fixture = TestFixture::new();
        let requester = IdentityKeypair::generate();

        let (key, envelope) = fixture.sealed_key(&requester.public_key(), &["admin"]);
        let opened = SecureEnvelope::open(&envelope, &requester).unwrap();
        assert_eq!(opened, key);
        opened.verify_with(&fixture.authority_key()).unwrap();
    }

    #[tokio::test]
    async fn test_registry_is_owned_by_fixture() {
        let fixture = TestFixture::with_seeds([1; 32], [2; 32]);
        let registry = fixture.memory_registry();
        assert_eq!(registry.owner(), fixture.owner_key());
        assert_eq!(registry.authority_key(), fixture.authority_key());
    }

    #[test]
    fn test_parties_are_distinct() {
        let pks: std::collections::HashSet<_> =
            parties(16).iter().map(|p| p.public_key()).collect();
        assert_eq!(pks.len(), 16);
    }

    #[test]
    fn test_parties_are_deterministic() {
        let first: Vec<_> = parties(4).iter().map(|p| p.public_key()).collect();
        let second: Vec<_> = parties(4).iter().map(|p| p.public_key()).collect();
        assert_eq!(first, second);
    }
}

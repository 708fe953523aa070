//! The key authority.
//!
//! A [`KeyAuthority`] holds one [`MasterSecret`] and issues [`DerivedKey`]s,
//! each bound to a requester identity and an [`AttributeSet`].
//!
//! ## Binding
//!
//! For a derivation with fresh random `blinding`:
//!
//! ```text
//! binding = DOMAIN || identity || canonical(attributes) || blinding
//! secret  = keyed_blake3(master.derive_key, binding)
//! sig     = ed25519(master.signing_key, binding || blake3(secret))
//! ```
//!
//! The same master and binding always reproduce the same secret, so the
//! authority can re-check any key it issued without storing it. The signature
//! lets a device that only knows the [`AuthorityKey`] check that the
//! attribute set in a presented key was certified.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use zeroize::Zeroize;

use attrgate_core::{
    AttributeSet, AuthorityKey, AuthorityKeypair, AuthoritySignature, Blake3Hash, IdentityKey,
};

use crate::error::{PermsError, Result};

const BINDING_DOMAIN: &[u8] = b"attrgate-authority-v0-binding";
const DERIVE_CONTEXT: &str = "attrgate-authority-v0 derive key";
const SIGNING_CONTEXT: &str = "attrgate-authority-v0 signing key";

/// The authority's root secret.
///
/// Created once from a 32-byte seed; the derivation and signing keys are
/// expanded from it. Zeroized on drop.
pub struct MasterSecret {
    seed: [u8; 32],
    derive_key: [u8; 32],
    signing: AuthorityKeypair,
}

impl MasterSecret {
    /// Expand a master secret from its seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let derive_key = blake3::derive_key(DERIVE_CONTEXT, &seed);
        let mut signing_seed = blake3::derive_key(SIGNING_CONTEXT, &seed);
        let signing = AuthorityKeypair::from_seed(&signing_seed);
        signing_seed.zeroize();

        Self {
            seed,
            derive_key,
            signing,
        }
    }

    /// Generate a master secret from the OS random number generator.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let master = Self::from_seed(seed);
        seed.zeroize();
        master
    }

    /// The public verifying key that certifies issued keys.
    pub fn public_key(&self) -> AuthorityKey {
        self.signing.public_key()
    }

    /// The seed this secret was expanded from.
    ///
    /// Only for writing the owner's local key file.
    pub fn expose_seed(&self) -> &[u8; 32] {
        &self.seed
    }

    fn compute_secret(&self, binding: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.derive_key, binding)
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.seed.zeroize();
        self.derive_key.zeroize();
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret({:?}, <redacted>)", self.public_key())
    }
}

/// Secret key material issued to one identity for one attribute set.
///
/// Never log or persist this in plaintext; seal it with
/// [`crate::SecureEnvelope`] before it leaves the authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedKey {
    identity: IdentityKey,
    attributes: AttributeSet,
    blinding: [u8; 32],
    secret: [u8; 32],
    signature: AuthoritySignature,
}

impl DerivedKey {
    /// The identity this key was issued to.
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// The attribute set this key is bound to.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// The raw secret bytes.
    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The authority's signature over the binding.
    pub fn signature(&self) -> &AuthoritySignature {
        &self.signature
    }

    /// Check the authority's signature over this key's binding.
    ///
    /// Needs only the public [`AuthorityKey`], so devices can call it.
    pub fn verify_with(&self, authority: &AuthorityKey) -> Result<()> {
        let message = signed_message(&self.binding(), &self.secret);
        authority
            .verify(&message, &self.signature)
            .map_err(|_| PermsError::BindingMismatch)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }

    fn binding(&self) -> Vec<u8> {
        binding_bytes(&self.identity, &self.attributes, &self.blinding)
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.blinding.zeroize();
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("identity", &self.identity)
            .field("attributes", &self.attributes)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn binding_bytes(identity: &IdentityKey, attributes: &AttributeSet, blinding: &[u8; 32]) -> Vec<u8> {
    let attrs = attributes.canonical_bytes();
    let mut buf = Vec::with_capacity(BINDING_DOMAIN.len() + 64 + attrs.len());
    buf.extend_from_slice(BINDING_DOMAIN);
    buf.extend_from_slice(identity.as_bytes());
    buf.extend_from_slice(&attrs);
    buf.extend_from_slice(blinding);
    buf
}

fn signed_message(binding: &[u8], secret: &[u8; 32]) -> Vec<u8> {
    let mut message = binding.to_vec();
    message.extend_from_slice(Blake3Hash::hash(secret).as_bytes());
    message
}

/// The attribute key authority.
///
/// Holds at most one master secret for its whole lifetime. After
/// initialization all operations take `&self` and touch only immutable
/// state, so one authority can serve concurrent derivations.
#[derive(Default)]
pub struct KeyAuthority {
    master: OnceLock<MasterSecret>,
}

impl KeyAuthority {
    /// Create an uninitialized authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an authority around an existing master secret.
    pub fn with_master(master: MasterSecret) -> Self {
        let authority = Self::new();
        // A fresh OnceLock always accepts its first value.
        let _ = authority.master.set(master);
        authority
    }

    /// Install the master secret expanded from `seed`.
    ///
    /// Fails with [`PermsError::AlreadyInitialized`] on every call after the
    /// first; the installed secret is never replaced.
    pub fn initialize(&self, seed: [u8; 32]) -> Result<&MasterSecret> {
        let mut installed = false;
        let master = self.master.get_or_init(|| {
            installed = true;
            MasterSecret::from_seed(seed)
        });

        if installed {
            Ok(master)
        } else {
            Err(PermsError::AlreadyInitialized)
        }
    }

    /// Whether a master secret is installed.
    pub fn is_initialized(&self) -> bool {
        self.master.get().is_some()
    }

    /// The authority's public verifying key, once initialized.
    pub fn public_key(&self) -> Option<AuthorityKey> {
        self.master.get().map(MasterSecret::public_key)
    }

    fn master(&self) -> Result<&MasterSecret> {
        self.master.get().ok_or(PermsError::NotInitialized)
    }

    /// Derive a key for `identity` bound to `attributes`.
    ///
    /// Each call draws fresh blinding, so two derivations for the same
    /// inputs produce different but equally valid keys.
    pub fn derive_key(&self, identity: &IdentityKey, attributes: &AttributeSet) -> Result<DerivedKey> {
        if attributes.is_empty() {
            return Err(PermsError::InvalidAttributes(
                "attribute set must not be empty".into(),
            ));
        }
        let master = self.master()?;

        let mut blinding = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut blinding);

        let binding = binding_bytes(identity, attributes, &blinding);
        let secret = *master.compute_secret(&binding).as_bytes();
        let signature = master.signing.sign(&signed_message(&binding, &secret));

        Ok(DerivedKey {
            identity: *identity,
            attributes: attributes.clone(),
            blinding,
            secret,
            signature,
        })
    }

    /// Check that `key` was issued by this authority and is unaltered.
    pub fn verify(&self, key: &DerivedKey) -> Result<()> {
        let master = self.master()?;

        // blake3::Hash equality is constant-time.
        let expected = master.compute_secret(&key.binding());
        if expected != blake3::Hash::from(key.secret) {
            return Err(PermsError::BindingMismatch);
        }

        key.verify_with(&master.public_key())
    }
}

impl fmt::Debug for KeyAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthority")
            .field("public_key", &self.public_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrgate_core::IdentityKeypair;
    use std::sync::Arc;

    fn attrs(names: &[&str]) -> AttributeSet {
        AttributeSet::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn test_initialize_twice_fails() {
        let authority = KeyAuthority::new();
        let pk = authority.initialize([1u8; 32]).unwrap().public_key();

        assert!(matches!(
            authority.initialize([2u8; 32]),
            Err(PermsError::AlreadyInitialized)
        ));
        // The first secret stays installed.
        assert_eq!(authority.public_key(), Some(pk));
    }

    #[test]
    fn test_derive_requires_initialization() {
        let authority = KeyAuthority::new();
        let id = IdentityKeypair::generate().public_key();

        assert!(matches!(
            authority.derive_key(&id, &attrs(&["admin"])),
            Err(PermsError::NotInitialized)
        ));
    }

    #[test]
    fn test_derive_rejects_empty_attributes() {
        let authority = KeyAuthority::with_master(MasterSecret::generate());
        let id = IdentityKeypair::generate().public_key();

        assert!(matches!(
            authority.derive_key(&id, &AttributeSet::empty()),
            Err(PermsError::InvalidAttributes(_))
        ));
    }

    #[test]
    fn test_derived_key_binds_identity_and_attributes() {
        let authority = KeyAuthority::with_master(MasterSecret::from_seed([9u8; 32]));
        let id = IdentityKeypair::generate().public_key();
        let set = attrs(&["admin", "it_departement"]);

        let key = authority.derive_key(&id, &set).unwrap();

        assert_eq!(key.identity(), &id);
        assert_eq!(key.attributes(), &set);
        authority.verify(&key).unwrap();
        key.verify_with(&authority.public_key().unwrap()).unwrap();
    }

    #[test]
    fn test_blinding_makes_each_derivation_distinct() {
        let authority = KeyAuthority::with_master(MasterSecret::generate());
        let id = IdentityKeypair::generate().public_key();
        let set = attrs(&["admin"]);

        let k1 = authority.derive_key(&id, &set).unwrap();
        let k2 = authority.derive_key(&id, &set).unwrap();

        assert_ne!(k1.secret(), k2.secret());
        authority.verify(&k1).unwrap();
        authority.verify(&k2).unwrap();
    }

    #[test]
    fn test_verify_rejects_other_authority() {
        let a = KeyAuthority::with_master(MasterSecret::from_seed([1u8; 32]));
        let b = KeyAuthority::with_master(MasterSecret::from_seed([2u8; 32]));
        let id = IdentityKeypair::generate().public_key();

        let key = a.derive_key(&id, &attrs(&["admin"])).unwrap();

        assert!(matches!(b.verify(&key), Err(PermsError::BindingMismatch)));
        assert!(key.verify_with(&b.public_key().unwrap()).is_err());
    }

    #[test]
    fn test_verify_rejects_swapped_attributes() {
        let authority = KeyAuthority::with_master(MasterSecret::generate());
        let id = IdentityKeypair::generate().public_key();

        let mut key = authority.derive_key(&id, &attrs(&["guest"])).unwrap();
        key.attributes = attrs(&["admin"]);

        assert!(matches!(authority.verify(&key), Err(PermsError::BindingMismatch)));
        assert!(key.verify_with(&authority.public_key().unwrap()).is_err());
    }

    #[test]
    fn test_master_from_seed_is_deterministic() {
        let a = MasterSecret::from_seed([5u8; 32]);
        let b = MasterSecret::from_seed([5u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.expose_seed(), &[5u8; 32]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let authority = KeyAuthority::with_master(MasterSecret::generate());
        let id = IdentityKeypair::generate().public_key();
        let key = authority.derive_key(&id, &attrs(&["admin"])).unwrap();

        let secret_hex = hex::encode(key.secret());
        let debug = format!("{key:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&secret_hex));
    }

    #[test]
    fn test_derived_key_cbor_roundtrip() {
        let authority = KeyAuthority::with_master(MasterSecret::generate());
        let id = IdentityKeypair::generate().public_key();
        let key = authority.derive_key(&id, &attrs(&["admin", "ops"])).unwrap();

        let recovered = DerivedKey::from_bytes(&key.to_bytes().unwrap()).unwrap();
        assert_eq!(key, recovered);
    }

    #[test]
    fn test_concurrent_derivations() {
        let authority = Arc::new(KeyAuthority::with_master(MasterSecret::generate()));
        let id = IdentityKeypair::generate().public_key();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let authority = Arc::clone(&authority);
                std::thread::spawn(move || authority.derive_key(&id, &attrs(&["admin"])).unwrap())
            })
            .collect();

        let keys: Vec<DerivedKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for key in &keys {
            authority.verify(key).unwrap();
        }
        let distinct: std::collections::HashSet<[u8; 32]> =
            keys.iter().map(|k| *k.secret()).collect();
        assert_eq!(distinct.len(), keys.len());
    }
}

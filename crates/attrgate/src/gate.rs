//! The Gate: owner-side facade over the authority and the registry.
//!
//! The owner derives a key for each granted requester, seals it to the
//! requester's identity and records it in the registry. Requesters recover
//! their key with [`Gate::recover_grant`].

use tracing::{debug, info};

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey, IdentityKeypair};
use attrgate_perms::{DerivedKey, Envelope, KeyAuthority, MasterSecret, SecureEnvelope};
use attrgate_policy::PolicyExpression;
use attrgate_registry::{GrantStatus, Registry};

use crate::config::GateConfig;
use crate::error::{GateError, Result};

/// Owner-side access gate.
pub struct Gate<R: Registry> {
    /// The identity the registry accepts mutations from.
    owner: IdentityKey,
    authority: KeyAuthority,
    registry: R,
    config: GateConfig,
}

impl<R: Registry> Gate<R> {
    /// Create the authority from `seed` and attach it to `registry`.
    pub fn bootstrap(
        owner: IdentityKey,
        seed: [u8; 32],
        registry: R,
        config: GateConfig,
    ) -> Result<Self> {
        let authority = KeyAuthority::new();
        authority.initialize(seed)?;
        Self::attach(owner, authority, registry, config)
    }

    /// Restore a gate around a master secret loaded from the owner's keys.
    pub fn with_master(
        owner: IdentityKey,
        master: MasterSecret,
        registry: R,
        config: GateConfig,
    ) -> Result<Self> {
        Self::attach(owner, KeyAuthority::with_master(master), registry, config)
    }

    fn attach(
        owner: IdentityKey,
        authority: KeyAuthority,
        registry: R,
        config: GateConfig,
    ) -> Result<Self> {
        if registry.owner() != owner {
            return Err(GateError::RegistryMismatch(format!(
                "registry is owned by {}, not {}",
                registry.owner().short(),
                owner.short()
            )));
        }

        let authority_key = authority
            .public_key()
            .ok_or(attrgate_perms::PermsError::NotInitialized)?;
        if registry.authority_key() != authority_key {
            return Err(GateError::RegistryMismatch(
                "registry certifies a different authority key".into(),
            ));
        }

        info!(owner = %owner.short(), authority = %authority_key.to_hex(), "gate ready");
        Ok(Self {
            owner,
            authority,
            registry,
            config,
        })
    }

    pub fn owner(&self) -> IdentityKey {
        self.owner
    }

    pub fn authority_key(&self) -> AuthorityKey {
        self.registry.authority_key()
    }

    pub fn authority(&self) -> &KeyAuthority {
        &self.authority
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Requests waiting for a decision, oldest first.
    pub async fn pending_requests(&self) -> Result<Vec<IdentityKey>> {
        Ok(self.registry.list_pending().await?)
    }

    /// Every device policy in the registry, ordered by device.
    pub async fn device_policies(&self) -> Result<Vec<(IdentityKey, String)>> {
        Ok(self.registry.list_device_policies().await?)
    }

    /// Grant `attributes` to `requester`.
    ///
    /// Derives a fresh key, seals it to the requester and stores the
    /// envelope. The plaintext key never leaves this call.
    pub async fn grant(
        &self,
        requester: &IdentityKey,
        attributes: &AttributeSet,
    ) -> Result<Envelope> {
        if attributes.len() > self.config.max_attributes {
            return Err(GateError::TooManyAttributes {
                count: attributes.len(),
                max: self.config.max_attributes,
            });
        }

        let envelope = {
            let key = self.authority.derive_key(requester, attributes)?;
            SecureEnvelope::seal(&key, requester)?
        };

        self.registry
            .grant_access(&self.owner, requester, &envelope, attributes)
            .await?;

        info!(requester = %requester.short(), attributes = %attributes, "grant issued");
        Ok(envelope)
    }

    /// Withdraw a pending request or an issued grant.
    pub async fn revoke(&self, requester: &IdentityKey) -> Result<()> {
        self.registry.revoke_access(&self.owner, requester).await?;
        Ok(())
    }

    /// Store the admission policy for `device`.
    ///
    /// With `reject_unparseable_policies` set, text that does not parse is
    /// refused before it reaches the registry.
    pub async fn set_device_policy(&self, device: &IdentityKey, policy: &str) -> Result<()> {
        if policy.len() > self.config.max_policy_len {
            return Err(GateError::PolicyTooLong {
                len: policy.len(),
                max: self.config.max_policy_len,
            });
        }

        if self.config.reject_unparseable_policies {
            let expr = PolicyExpression::parse(policy)?;
            debug!(device = %device.short(), canonical = %expr, "policy parsed");
        }

        self.registry
            .set_device_policy(&self.owner, device, policy)
            .await?;
        Ok(())
    }

    pub async fn remove_device_policy(&self, device: &IdentityKey) -> Result<()> {
        self.registry
            .remove_device_policy(&self.owner, device)
            .await?;
        Ok(())
    }

    /// Recover the key granted to `keypair` from `registry`.
    ///
    /// The envelope is opened with the requester's private key, then the
    /// key is checked against the requester's identity, the registry's
    /// authority key and the recorded attributes.
    pub async fn recover_grant(registry: &R, keypair: &IdentityKeypair) -> Result<DerivedKey> {
        recover_grant(registry, keypair).await
    }
}

/// Free-standing form of [`Gate::recover_grant`], usable with any registry.
pub async fn recover_grant<R: Registry + ?Sized>(
    registry: &R,
    keypair: &IdentityKeypair,
) -> Result<DerivedKey> {
    let identity = keypair.public_key();
    let record = registry.get_grant(&identity).await?;

    let (envelope, attributes) = match (record.envelope, record.attributes) {
        (Some(envelope), Some(attributes)) if record.status == GrantStatus::Granted => {
            (envelope, attributes)
        }
        _ => return Err(GateError::NoGrant(identity)),
    };

    let key = SecureEnvelope::open(&envelope, keypair)?;
    if key.identity() != &identity {
        return Err(GateError::IdentityMismatch {
            issued: *key.identity(),
            expected: identity,
        });
    }
    key.verify_with(&registry.authority_key())?;
    if key.attributes() != &attributes {
        return Err(GateError::AttributesMismatch);
    }

    debug!(requester = %identity.short(), "grant recovered");
    Ok(key)
}

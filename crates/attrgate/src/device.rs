//! Device-side admission.

use tracing::{debug, info};

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey, IdentityKeypair, Timestamp};
use attrgate_perms::{DerivedKey, SealedPayload};
use attrgate_policy::PolicyExpression;
use attrgate_registry::Registry;

use crate::error::{GateError, Result};

/// Decides local admission for one device.
///
/// Holds the device's current policy and the authority key used to check
/// presented keys. A device with no policy admits nobody.
#[derive(Debug, Clone)]
pub struct DeviceGuard {
    device: IdentityKey,
    authority_key: AuthorityKey,
    policy: Option<PolicyExpression>,
}

impl DeviceGuard {
    pub fn new(device: IdentityKey, authority_key: AuthorityKey) -> Self {
        Self {
            device,
            authority_key,
            policy: None,
        }
    }

    pub fn device(&self) -> IdentityKey {
        self.device
    }

    pub fn policy(&self) -> Option<&PolicyExpression> {
        self.policy.as_ref()
    }

    /// Replace the policy with `text`. On a parse error the old policy stays.
    pub fn set_policy(&mut self, text: &str) -> Result<()> {
        self.policy = Some(PolicyExpression::parse(text)?);
        Ok(())
    }

    pub fn clear_policy(&mut self) {
        self.policy = None;
    }

    /// Load the device's current policy from `registry`.
    pub async fn refresh<R: Registry + ?Sized>(&mut self, registry: &R) -> Result<()> {
        match registry.get_device_policy(&self.device).await? {
            Some(text) => self.set_policy(&text)?,
            None => self.clear_policy(),
        }
        debug!(
            device = %self.device.short(),
            has_policy = self.policy.is_some(),
            "policy refreshed"
        );
        Ok(())
    }

    /// Evaluate `policy` text against presented attributes at `now`.
    pub fn admit_with(policy: &str, attributes: &AttributeSet, now: Timestamp) -> Result<bool> {
        Ok(PolicyExpression::parse(policy)?.evaluate(attributes, now))
    }

    /// Evaluate the current policy against presented attributes at `now`.
    pub fn admit(&self, attributes: &AttributeSet, now: Timestamp) -> bool {
        let admitted = self
            .policy
            .as_ref()
            .map(|policy| policy.evaluate(attributes, now))
            .unwrap_or(false);
        debug!(device = %self.device.short(), %attributes, %now, admitted, "admission decision");
        admitted
    }

    /// Check that `key` was certified by the authority, then evaluate the
    /// policy against the attributes it carries.
    pub fn admit_key(&self, key: &DerivedKey, now: Timestamp) -> Result<bool> {
        key.verify_with(&self.authority_key)?;
        Ok(self.admit(key.attributes(), now))
    }

    /// Seal `data` for the holder of `key` if the policy admits it at `now`.
    ///
    /// Only the identity the key was issued to, holding this same key, can
    /// open the result with [`open_payload`].
    pub fn seal_payload(
        &self,
        key: &DerivedKey,
        now: Timestamp,
        data: &[u8],
    ) -> Result<SealedPayload> {
        if !self.admit_key(key, now)? {
            return Err(GateError::NotAdmitted {
                device: self.device,
            });
        }
        let sealed = SealedPayload::seal(data, key)?;
        info!(
            device = %self.device.short(),
            holder = %key.identity().short(),
            len = data.len(),
            "payload sealed"
        );
        Ok(sealed)
    }
}

/// Open a payload a device sealed for `key`, using the holder's identity.
pub fn open_payload(
    payload: &SealedPayload,
    key: &DerivedKey,
    holder: &IdentityKeypair,
) -> Result<Vec<u8>> {
    Ok(payload.open(key, holder)?)
}

//! Registry trait: the interface the owner, requesters and devices share.
//!
//! The registry is the shared bookkeeping between parties: who asked for
//! access, which sealed key and attributes were granted, and which policy
//! each device enforces. Mutations other than `request_access` are gated
//! to the owner identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey};
use attrgate_perms::Envelope;

use crate::error::{RegistryError, Result};

/// Capacity of each backend's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where a requester stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantStatus {
    None,
    Pending,
    Granted,
}

impl GrantStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            GrantStatus::None => 0,
            GrantStatus::Pending => 1,
            GrantStatus::Granted => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(GrantStatus::None),
            1 => Some(GrantStatus::Pending),
            2 => Some(GrantStatus::Granted),
            _ => None,
        }
    }
}

/// Per-requester state held by the registry.
///
/// `envelope` and `attributes` are set exactly when `status` is `Granted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRecord {
    pub requester: IdentityKey,
    pub status: GrantStatus,
    pub envelope: Option<Envelope>,
    pub attributes: Option<AttributeSet>,
}

impl GrantRecord {
    /// The record of a requester the registry has never seen.
    pub fn none(requester: IdentityKey) -> Self {
        Self {
            requester,
            status: GrantStatus::None,
            envelope: None,
            attributes: None,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.status == GrantStatus::Granted
    }
}

/// Result of a request for access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The requester moved from `None` to `Pending`.
    Requested,
    /// A request was already pending (no-op).
    AlreadyPending,
    /// The requester already holds a grant (no-op).
    AlreadyGranted,
}

/// Notification of a successful registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    AccessRequested {
        requester: IdentityKey,
    },
    AccessGranted {
        requester: IdentityKey,
        envelope: Envelope,
        attributes: AttributeSet,
    },
    AccessRevoked {
        requester: IdentityKey,
    },
    DevicePolicyUpdated {
        device: IdentityKey,
        policy: String,
    },
    DevicePolicyDeleted {
        device: IdentityKey,
    },
}

/// The access registry.
///
/// # Design Notes
///
/// - **Owner gate**: every mutation except `request_access` takes the caller
///   identity and fails with `NotOwner` unless it is [`Registry::owner`].
/// - **Serialized transitions**: each backend applies a mutation atomically,
///   so a requester cannot be granted twice.
/// - **Events**: one event per successful mutation, none on failure or on a
///   no-op request.
#[async_trait]
pub trait Registry: Send + Sync {
    /// The identity allowed to grant, revoke and set policies.
    fn owner(&self) -> IdentityKey;

    /// The authority key that certifies every granted key.
    fn authority_key(&self) -> AuthorityKey;

    /// Record a request for access.
    async fn request_access(&self, requester: &IdentityKey) -> Result<RequestOutcome>;

    /// Store a sealed key and its attributes for `requester`.
    ///
    /// Accepted from `None` or `Pending`; fails with `AlreadyGranted` if a
    /// grant is already held.
    async fn grant_access(
        &self,
        caller: &IdentityKey,
        requester: &IdentityKey,
        envelope: &Envelope,
        attributes: &AttributeSet,
    ) -> Result<()>;

    /// Drop a pending request or a grant, returning the requester to `None`.
    async fn revoke_access(&self, caller: &IdentityKey, requester: &IdentityKey) -> Result<()>;

    /// Set or replace the policy text of a device.
    async fn set_device_policy(
        &self,
        caller: &IdentityKey,
        device: &IdentityKey,
        policy: &str,
    ) -> Result<()>;

    /// Clear the policy of a device.
    async fn remove_device_policy(&self, caller: &IdentityKey, device: &IdentityKey)
        -> Result<()>;

    async fn get_grant(&self, requester: &IdentityKey) -> Result<GrantRecord>;

    async fn get_device_policy(&self, device: &IdentityKey) -> Result<Option<String>>;

    /// Every device with a policy, ordered by device key.
    async fn list_device_policies(&self) -> Result<Vec<(IdentityKey, String)>>;

    /// Requesters currently waiting for the owner, in request order.
    async fn list_pending(&self) -> Result<Vec<IdentityKey>>;

    /// Receive every event emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent>;
}

/// Reject callers other than `owner`.
pub(crate) fn ensure_owner(owner: &IdentityKey, caller: &IdentityKey) -> Result<()> {
    if owner != caller {
        return Err(RegistryError::NotOwner { caller: *caller });
    }
    Ok(())
}

pub(crate) fn ensure_attributes(attributes: &AttributeSet) -> Result<()> {
    if attributes.is_empty() {
        return Err(RegistryError::InvalidAttributes(
            "a grant needs at least one attribute".into(),
        ));
    }
    Ok(())
}

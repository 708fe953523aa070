//! In-memory implementation of the Registry trait.
//!
//! Same semantics as the SQLite backend with no persistence. Used by tests
//! and by embedders that keep the registry elsewhere.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey};
use attrgate_perms::Envelope;

use crate::error::{RegistryError, Result};
use crate::traits::{
    ensure_attributes, ensure_owner, GrantRecord, GrantStatus, Registry, RegistryEvent,
    RequestOutcome, EVENT_CHANNEL_CAPACITY,
};

/// In-memory registry.
///
/// All data is lost when the registry is dropped. Thread-safe via RwLock.
pub struct MemoryRegistry {
    owner: IdentityKey,
    authority_key: AuthorityKey,
    inner: RwLock<MemoryRegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
}

#[derive(Default)]
struct MemoryRegistryInner {
    /// Grant records by requester, with the order their request arrived in.
    grants: HashMap<IdentityKey, (u64, GrantRecord)>,

    /// Device policy text by device.
    policies: HashMap<IdentityKey, String>,

    next_request: u64,
}

impl MemoryRegistry {
    /// Create an empty registry owned by `owner`.
    pub fn new(owner: IdentityKey, authority_key: AuthorityKey) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            owner,
            authority_key,
            inner: RwLock::new(MemoryRegistryInner::default()),
            events,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryRegistryInner>> {
        self.inner.read().map_err(|_| RegistryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryRegistryInner>> {
        self.inner.write().map_err(|_| RegistryError::Poisoned)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn owner(&self) -> IdentityKey {
        self.owner
    }

    fn authority_key(&self) -> AuthorityKey {
        self.authority_key
    }

    async fn request_access(&self, requester: &IdentityKey) -> Result<RequestOutcome> {
        let mut inner = self.write()?;

        let status = inner
            .grants
            .get(requester)
            .map(|(_, record)| record.status)
            .unwrap_or(GrantStatus::None);

        match status {
            GrantStatus::Pending => return Ok(RequestOutcome::AlreadyPending),
            GrantStatus::Granted => return Ok(RequestOutcome::AlreadyGranted),
            GrantStatus::None => {}
        }

        let seq = inner.next_request;
        inner.next_request += 1;
        let mut record = GrantRecord::none(*requester);
        record.status = GrantStatus::Pending;
        inner.grants.insert(*requester, (seq, record));

        debug!(requester = %requester.short(), "access requested");
        self.emit(RegistryEvent::AccessRequested {
            requester: *requester,
        });
        Ok(RequestOutcome::Requested)
    }

    async fn grant_access(
        &self,
        caller: &IdentityKey,
        requester: &IdentityKey,
        envelope: &Envelope,
        attributes: &AttributeSet,
    ) -> Result<()> {
        ensure_owner(&self.owner, caller)?;
        ensure_attributes(attributes)?;

        let mut inner = self.write()?;
        let seq = match inner.grants.get(requester) {
            Some((_, record)) if record.is_granted() => {
                return Err(RegistryError::AlreadyGranted(*requester))
            }
            Some((seq, _)) => *seq,
            None => {
                let seq = inner.next_request;
                inner.next_request += 1;
                seq
            }
        };

        let record = GrantRecord {
            requester: *requester,
            status: GrantStatus::Granted,
            envelope: Some(envelope.clone()),
            attributes: Some(attributes.clone()),
        };
        inner.grants.insert(*requester, (seq, record));

        info!(requester = %requester.short(), attributes = %attributes, "access granted");
        self.emit(RegistryEvent::AccessGranted {
            requester: *requester,
            envelope: envelope.clone(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    async fn revoke_access(&self, caller: &IdentityKey, requester: &IdentityKey) -> Result<()> {
        ensure_owner(&self.owner, caller)?;

        let mut inner = self.write()?;
        match inner.grants.remove(requester) {
            Some((_, record)) if record.status != GrantStatus::None => {}
            _ => return Err(RegistryError::NoSuchGrant(*requester)),
        }

        info!(requester = %requester.short(), "access revoked");
        self.emit(RegistryEvent::AccessRevoked {
            requester: *requester,
        });
        Ok(())
    }

    async fn set_device_policy(
        &self,
        caller: &IdentityKey,
        device: &IdentityKey,
        policy: &str,
    ) -> Result<()> {
        ensure_owner(&self.owner, caller)?;

        let mut inner = self.write()?;
        inner.policies.insert(*device, policy.to_string());

        info!(device = %device.short(), policy, "device policy updated");
        self.emit(RegistryEvent::DevicePolicyUpdated {
            device: *device,
            policy: policy.to_string(),
        });
        Ok(())
    }

    async fn remove_device_policy(
        &self,
        caller: &IdentityKey,
        device: &IdentityKey,
    ) -> Result<()> {
        ensure_owner(&self.owner, caller)?;

        let mut inner = self.write()?;
        inner.policies.remove(device);

        info!(device = %device.short(), "device policy deleted");
        self.emit(RegistryEvent::DevicePolicyDeleted { device: *device });
        Ok(())
    }

    async fn get_grant(&self, requester: &IdentityKey) -> Result<GrantRecord> {
        let inner = self.read()?;
        Ok(inner
            .grants
            .get(requester)
            .map(|(_, record)| record.clone())
            .unwrap_or_else(|| GrantRecord::none(*requester)))
    }

    async fn get_device_policy(&self, device: &IdentityKey) -> Result<Option<String>> {
        let inner = self.read()?;
        Ok(inner.policies.get(device).cloned())
    }

    async fn list_device_policies(&self) -> Result<Vec<(IdentityKey, String)>> {
        let inner = self.read()?;
        let mut policies: Vec<(IdentityKey, String)> = inner
            .policies
            .iter()
            .map(|(device, policy)| (*device, policy.clone()))
            .collect();
        policies.sort();
        Ok(policies)
    }

    async fn list_pending(&self) -> Result<Vec<IdentityKey>> {
        let inner = self.read()?;
        let mut pending: Vec<(u64, IdentityKey)> = inner
            .grants
            .values()
            .filter(|(_, record)| record.status == GrantStatus::Pending)
            .map(|(seq, record)| (*seq, record.requester))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, requester)| requester).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrgate_core::{AuthorityKeypair, IdentityKeypair};
    use attrgate_perms::{KeyAuthority, SecureEnvelope};

    struct Setup {
        registry: MemoryRegistry,
        owner: IdentityKey,
        authority: KeyAuthority,
    }

    fn setup() -> Setup {
        let owner = IdentityKeypair::generate().public_key();
        let authority = KeyAuthority::new();
        authority.initialize([9u8; 32]).unwrap();
        let authority_key = authority.public_key().unwrap();
        Setup {
            registry: MemoryRegistry::new(owner, authority_key),
            owner,
            authority,
        }
    }

    fn sealed_for(setup: &Setup, requester: &IdentityKey, attrs: &AttributeSet) -> Envelope {
        let key = setup.authority.derive_key(requester, attrs).unwrap();
        SecureEnvelope::seal(&key, requester).unwrap()
    }

    #[tokio::test]
    async fn test_request_then_grant() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let mut events = s.registry.subscribe();

        let outcome = s.registry.request_access(&requester).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Requested);
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::AccessRequested { requester }
        );

        let record = s.registry.get_grant(&requester).await.unwrap();
        assert_eq!(record.status, GrantStatus::Pending);
        assert!(record.envelope.is_none());

        let attrs = AttributeSet::new(["admin", "it_departement"]).unwrap();
        let envelope = sealed_for(&s, &requester, &attrs);
        s.registry
            .grant_access(&s.owner, &requester, &envelope, &attrs)
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            RegistryEvent::AccessGranted {
                requester: r,
                envelope: e,
                attributes,
            } => {
                assert_eq!(r, requester);
                assert_eq!(e, envelope);
                assert_eq!(attributes, attrs);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let record = s.registry.get_grant(&requester).await.unwrap();
        assert!(record.is_granted());
        assert_eq!(record.envelope, Some(envelope));
        assert_eq!(record.attributes, Some(attrs));
    }

    #[tokio::test]
    async fn test_duplicate_request_is_noop() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let mut events = s.registry.subscribe();

        s.registry.request_access(&requester).await.unwrap();
        let again = s.registry.request_access(&requester).await.unwrap();
        assert_eq!(again, RequestOutcome::AlreadyPending);

        events.recv().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_owner_is_rejected_without_event() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let attrs = AttributeSet::new(["admin"]).unwrap();
        let envelope = sealed_for(&s, &requester, &attrs);
        let mut events = s.registry.subscribe();

        let err = s
            .registry
            .grant_access(&requester, &requester, &envelope, &attrs)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner { .. }));
        assert!(err.to_string().contains("is not owner"));

        let err = s
            .registry
            .set_device_policy(&requester, &requester, "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner { .. }));

        assert!(events.try_recv().is_err());
        assert_eq!(
            s.registry.get_grant(&requester).await.unwrap().status,
            GrantStatus::None
        );
    }

    #[tokio::test]
    async fn test_double_grant_rejected() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let attrs = AttributeSet::new(["admin"]).unwrap();
        let envelope = sealed_for(&s, &requester, &attrs);

        s.registry
            .grant_access(&s.owner, &requester, &envelope, &attrs)
            .await
            .unwrap();
        let err = s
            .registry
            .grant_access(&s.owner, &requester, &envelope, &attrs)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyGranted(_)));

        let outcome = s.registry.request_access(&requester).await.unwrap();
        assert_eq!(outcome, RequestOutcome::AlreadyGranted);
    }

    #[tokio::test]
    async fn test_empty_attributes_rejected() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let envelope = sealed_for(&s, &requester, &AttributeSet::new(["x"]).unwrap());

        let err = s
            .registry
            .grant_access(&s.owner, &requester, &envelope, &AttributeSet::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAttributes(_)));
    }

    #[tokio::test]
    async fn test_revoke() {
        let s = setup();
        let requester = IdentityKeypair::generate().public_key();
        let attrs = AttributeSet::new(["admin"]).unwrap();
        let envelope = sealed_for(&s, &requester, &attrs);

        let err = s
            .registry
            .revoke_access(&s.owner, &requester)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoSuchGrant(_)));

        s.registry
            .grant_access(&s.owner, &requester, &envelope, &attrs)
            .await
            .unwrap();
        s.registry.revoke_access(&s.owner, &requester).await.unwrap();

        let record = s.registry.get_grant(&requester).await.unwrap();
        assert_eq!(record, GrantRecord::none(requester));

        // A revoked requester may ask again.
        let outcome = s.registry.request_access(&requester).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Requested);
    }

    #[tokio::test]
    async fn test_list_device_policies_sorted_by_device() {
        let s = setup();
        let a = IdentityKey::from_bytes([1; 32]);
        let b = IdentityKey::from_bytes([2; 32]);
        assert!(s.registry.list_device_policies().await.unwrap().is_empty());

        s.registry.set_device_policy(&s.owner, &b, "ops").await.unwrap();
        s.registry.set_device_policy(&s.owner, &a, "admin").await.unwrap();
        s.registry.set_device_policy(&s.owner, &b, "ops OR admin").await.unwrap();
        assert_eq!(
            s.registry.list_device_policies().await.unwrap(),
            vec![(a, "admin".to_string()), (b, "ops OR admin".to_string())]
        );

        s.registry.remove_device_policy(&s.owner, &a).await.unwrap();
        assert_eq!(
            s.registry.list_device_policies().await.unwrap(),
            vec![(b, "ops OR admin".to_string())]
        );
    }

    #[tokio::test]
    async fn test_device_policy_lifecycle() {
        let s = setup();
        let device = IdentityKeypair::generate().public_key();
        let mut events = s.registry.subscribe();

        assert_eq!(s.registry.get_device_policy(&device).await.unwrap(), None);

        let policy = "(admin AND date > 15434456322)";
        s.registry
            .set_device_policy(&s.owner, &device, policy)
            .await
            .unwrap();
        assert_eq!(
            s.registry.get_device_policy(&device).await.unwrap().as_deref(),
            Some(policy)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DevicePolicyUpdated {
                device,
                policy: policy.to_string()
            }
        );

        s.registry
            .remove_device_policy(&s.owner, &device)
            .await
            .unwrap();
        assert_eq!(s.registry.get_device_policy(&device).await.unwrap(), None);
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::DevicePolicyDeleted { device }
        );
    }

    #[tokio::test]
    async fn test_list_pending_in_request_order() {
        let s = setup();
        let a = IdentityKeypair::generate().public_key();
        let b = IdentityKeypair::generate().public_key();
        let c = IdentityKeypair::generate().public_key();

        for requester in [&b, &a, &c] {
            s.registry.request_access(requester).await.unwrap();
        }
        let attrs = AttributeSet::new(["guest"]).unwrap();
        let envelope = sealed_for(&s, &a, &attrs);
        s.registry
            .grant_access(&s.owner, &a, &envelope, &attrs)
            .await
            .unwrap();

        assert_eq!(s.registry.list_pending().await.unwrap(), vec![b, c]);
    }

    #[test]
    fn test_owner_and_authority_accessors() {
        let owner = IdentityKeypair::generate().public_key();
        let authority_key = AuthorityKeypair::from_seed(&[1u8; 32]).public_key();
        let registry = MemoryRegistry::new(owner, authority_key);
        assert_eq!(registry.owner(), owner);
        assert_eq!(registry.authority_key(), authority_key);
    }
}

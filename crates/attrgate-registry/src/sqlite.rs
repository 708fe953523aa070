//! SQLite implementation of the Registry trait.
//!
//! Uses rusqlite with bundled SQLite. Every call runs on the blocking pool
//! via `tokio::task::spawn_blocking`, and every mutation is one transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::broadcast;
use tracing::{debug, info};

use attrgate_core::{AttributeSet, AuthorityKey, IdentityKey, Timestamp};
use attrgate_perms::Envelope;

use crate::error::{RegistryError, Result};
use crate::migration;
use crate::traits::{
    ensure_attributes, ensure_owner, GrantRecord, GrantStatus, Registry, RegistryEvent,
    RequestOutcome, EVENT_CHANNEL_CAPACITY,
};

const META_OWNER: &str = "owner";
const META_AUTHORITY_KEY: &str = "authority_key";

/// SQLite-backed registry.
///
/// Thread-safe via an internal mutex around the connection.
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
    owner: IdentityKey,
    authority_key: AuthorityKey,
    events: broadcast::Sender<RegistryEvent>,
}

impl SqliteRegistry {
    /// Open or create a registry file owned by `owner`.
    ///
    /// A file created for a different owner or authority key is rejected.
    pub fn open(
        path: impl AsRef<Path>,
        owner: IdentityKey,
        authority_key: AuthorityKey,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, owner, authority_key)
    }

    /// Open an in-memory registry. Useful for testing.
    pub fn open_memory(owner: IdentityKey, authority_key: AuthorityKey) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, owner, authority_key)
    }

    /// Reopen an existing registry file, reading its owner and authority key.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;

        let owner = read_meta(&conn, META_OWNER)?
            .ok_or_else(|| RegistryError::InvalidData("registry has no owner".into()))?;
        let authority_key = read_meta(&conn, META_AUTHORITY_KEY)?
            .ok_or_else(|| RegistryError::InvalidData("registry has no authority key".into()))?;

        Ok(Self::from_parts(
            conn,
            IdentityKey::from_bytes(owner),
            AuthorityKey(authority_key),
        ))
    }

    fn init(mut conn: Connection, owner: IdentityKey, authority_key: AuthorityKey) -> Result<Self> {
        migration::migrate(&mut conn)?;

        let tx = conn.transaction()?;
        bind_meta(&tx, META_OWNER, owner.as_bytes())?;
        bind_meta(&tx, META_AUTHORITY_KEY, &authority_key.0)?;
        tx.commit()?;

        Ok(Self::from_parts(conn, owner, authority_key))
    }

    fn from_parts(conn: Connection, owner: IdentityKey, authority_key: AuthorityKey) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            owner,
            authority_key,
            events,
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| RegistryError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RegistryError::Task(e.to_string()))?
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Record `value` under `key`, or check it matches what is already there.
fn bind_meta(tx: &Transaction<'_>, key: &str, value: &[u8; 32]) -> Result<()> {
    match read_meta(tx, key)? {
        Some(existing) if &existing != value => Err(RegistryError::InvalidData(format!(
            "registry {} mismatch: stored {}, given {}",
            key,
            hex_short(&existing),
            hex_short(value)
        ))),
        Some(_) => Ok(()),
        None => {
            tx.execute(
                "INSERT INTO registry_meta (key, value) VALUES (?1, ?2)",
                params![key, value.as_slice()],
            )?;
            Ok(())
        }
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<[u8; 32]>> {
    let value: Option<Vec<u8>> = conn
        .query_row(
            "SELECT value FROM registry_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    value.map(|bytes| blob_to_array(bytes, key)).transpose()
}

fn hex_short(bytes: &[u8; 32]) -> String {
    IdentityKey::from_bytes(*bytes).short()
}

fn blob_to_array(bytes: Vec<u8>, column: &str) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|b: Vec<u8>| {
        RegistryError::InvalidData(format!("{} must be 32 bytes, got {}", column, b.len()))
    })
}

fn encode_attributes(attributes: &AttributeSet) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(attributes, &mut buf)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_attributes(bytes: &[u8]) -> Result<AttributeSet> {
    ciborium::from_reader(bytes).map_err(|e| RegistryError::Serialization(e.to_string()))
}

fn now_secs() -> i64 {
    Timestamp::now().as_u64() as i64
}

fn next_request_seq(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(request_seq), 0) + 1 FROM grants",
        [],
        |row| row.get(0),
    )?)
}

/// Status and request order of a requester, if a row exists.
fn grant_row(conn: &Connection, requester: &IdentityKey) -> Result<Option<(GrantStatus, i64)>> {
    let row: Option<(u8, i64)> = conn
        .query_row(
            "SELECT status, request_seq FROM grants WHERE requester = ?1",
            params![requester.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(status, seq)| {
        GrantStatus::from_u8(status)
            .map(|status| (status, seq))
            .ok_or_else(|| RegistryError::InvalidData(format!("unknown grant status {}", status)))
    })
    .transpose()
}

#[async_trait]
impl Registry for SqliteRegistry {
    fn owner(&self) -> IdentityKey {
        self.owner
    }

    fn authority_key(&self) -> AuthorityKey {
        self.authority_key
    }

    async fn request_access(&self, requester: &IdentityKey) -> Result<RequestOutcome> {
        let requester = *requester;

        let outcome = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                match grant_row(&tx, &requester)?.map(|(status, _)| status) {
                    Some(GrantStatus::Pending) => return Ok(RequestOutcome::AlreadyPending),
                    Some(GrantStatus::Granted) => return Ok(RequestOutcome::AlreadyGranted),
                    Some(GrantStatus::None) | None => {}
                }

                let seq = next_request_seq(&tx)?;
                tx.execute(
                    "INSERT OR REPLACE INTO grants
                        (requester, status, envelope, attributes, request_seq, updated_at)
                     VALUES (?1, ?2, NULL, NULL, ?3, ?4)",
                    params![
                        requester.as_bytes().as_slice(),
                        GrantStatus::Pending.as_u8(),
                        seq,
                        now_secs()
                    ],
                )?;
                tx.commit()?;
                Ok(RequestOutcome::Requested)
            })
            .await?;

        if outcome == RequestOutcome::Requested {
            debug!(requester = %requester.short(), "access requested");
            self.emit(RegistryEvent::AccessRequested { requester });
        }
        Ok(outcome)
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

        let requester = *requester;
        let envelope_bytes = envelope.to_bytes();
        let attributes_cbor = encode_attributes(attributes)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let seq = match grant_row(&tx, &requester)? {
                Some((GrantStatus::Granted, _)) => {
                    return Err(RegistryError::AlreadyGranted(requester))
                }
                Some((_, seq)) => seq,
                None => next_request_seq(&tx)?,
            };

            tx.execute(
                "INSERT OR REPLACE INTO grants
                    (requester, status, envelope, attributes, request_seq, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    requester.as_bytes().as_slice(),
                    GrantStatus::Granted.as_u8(),
                    envelope_bytes,
                    attributes_cbor,
                    seq,
                    now_secs()
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        info!(requester = %requester.short(), attributes = %attributes, "access granted");
        self.emit(RegistryEvent::AccessGranted {
            requester,
            envelope: envelope.clone(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    async fn revoke_access(&self, caller: &IdentityKey, requester: &IdentityKey) -> Result<()> {
        ensure_owner(&self.owner, caller)?;
        let requester = *requester;

        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM grants WHERE requester = ?1 AND status != ?2",
                params![requester.as_bytes().as_slice(), GrantStatus::None.as_u8()],
            )?;
            if deleted == 0 {
                return Err(RegistryError::NoSuchGrant(requester));
            }
            Ok(())
        })
        .await?;

        info!(requester = %requester.short(), "access revoked");
        self.emit(RegistryEvent::AccessRevoked { requester });
        Ok(())
    }

    async fn set_device_policy(
        &self,
        caller: &IdentityKey,
        device: &IdentityKey,
        policy: &str,
    ) -> Result<()> {
        ensure_owner(&self.owner, caller)?;
        let device = *device;
        let text = policy.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO device_policies (device, policy, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![device.as_bytes().as_slice(), text, now_secs()],
            )?;
            Ok(())
        })
        .await?;

        info!(device = %device.short(), policy, "device policy updated");
        self.emit(RegistryEvent::DevicePolicyUpdated {
            device,
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
        let device = *device;

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM device_policies WHERE device = ?1",
                params![device.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await?;

        info!(device = %device.short(), "device policy deleted");
        self.emit(RegistryEvent::DevicePolicyDeleted { device });
        Ok(())
    }

    async fn get_grant(&self, requester: &IdentityKey) -> Result<GrantRecord> {
        let requester = *requester;

        self.with_conn(move |conn| {
            let row: Option<(u8, Option<Vec<u8>>, Option<Vec<u8>>)> = conn
                .query_row(
                    "SELECT status, envelope, attributes FROM grants WHERE requester = ?1",
                    params![requester.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((status, envelope, attributes)) = row else {
                return Ok(GrantRecord::none(requester));
            };

            let status = GrantStatus::from_u8(status).ok_or_else(|| {
                RegistryError::InvalidData(format!("unknown grant status {}", status))
            })?;
            let envelope = envelope
                .map(|bytes| {
                    Envelope::from_bytes(&bytes)
                        .map_err(|e| RegistryError::InvalidData(e.to_string()))
                })
                .transpose()?;
            let attributes = attributes
                .map(|bytes| decode_attributes(&bytes))
                .transpose()?;

            Ok(GrantRecord {
                requester,
                status,
                envelope,
                attributes,
            })
        })
        .await
    }

    async fn get_device_policy(&self, device: &IdentityKey) -> Result<Option<String>> {
        let device = *device;

        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT policy FROM device_policies WHERE device = ?1",
                    params![device.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn list_device_policies(&self) -> Result<Vec<(IdentityKey, String)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT device, policy FROM device_policies ORDER BY device")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut policies = Vec::new();
            for row in rows {
                let (device, policy) = row?;
                policies.push((IdentityKey::from_bytes(blob_to_array(device, "device")?), policy));
            }
            Ok(policies)
        })
        .await
    }

    async fn list_pending(&self) -> Result<Vec<IdentityKey>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT requester FROM grants WHERE status = ?1 ORDER BY request_seq",
            )?;
            let rows = stmt.query_map(params![GrantStatus::Pending.as_u8()], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;

            let mut pending = Vec::new();
            for row in rows {
                pending.push(IdentityKey::from_bytes(blob_to_array(row?, "requester")?));
            }
            Ok(pending)
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

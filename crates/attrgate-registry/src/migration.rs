//! Database schema migrations for SQLite.
//!
//! Each migration is a SQL batch that moves the schema from version N to
//! N+1. Applied versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use attrgate_core::Timestamp;

use crate::error::{RegistryError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(RegistryError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, Timestamp::now().as_u64() as i64],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(RegistryError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Owner and authority key of this registry
        CREATE TABLE registry_meta (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        );

        -- Per-requester grant state
        CREATE TABLE grants (
            requester BLOB PRIMARY KEY,       -- 32 bytes, X25519 public key
            status INTEGER NOT NULL,          -- 0=none, 1=pending, 2=granted
            envelope BLOB,                    -- sealed derived key, set when granted
            attributes BLOB,                  -- CBOR array of names, set when granted
            request_seq INTEGER NOT NULL,     -- arrival order of the request
            updated_at INTEGER NOT NULL       -- Unix seconds
        );

        -- Device admission policies
        CREATE TABLE device_policies (
            device BLOB PRIMARY KEY,          -- 32 bytes, X25519 public key
            policy TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX idx_grants_status ON grants(status, request_seq);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"grants".to_string()));
        assert!(tables.contains(&"device_policies".to_string()));
        assert!(tables.contains(&"registry_meta".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(
            migrate(&mut conn),
            Err(RegistryError::Migration(_))
        ));
    }
}

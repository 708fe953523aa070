//! Gate configuration and the owner's key file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use attrgate_core::{AuthorityKey, Timestamp};
use attrgate_perms::MasterSecret;

use crate::error::{GateError, Result};

/// Configuration for the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Largest attribute set the owner will grant.
    pub max_attributes: usize,
    /// Largest device policy text accepted, in bytes.
    pub max_policy_len: usize,
    /// Parse device policies before storing them.
    pub reject_unparseable_policies: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_attributes: 32,
            max_policy_len: 1024,
            reject_unparseable_policies: true,
        }
    }
}

impl GateConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(GateError::Config("configuration must be a JSON object".into()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// The owner's persisted authority keys.
///
/// Written once when the authority is created and read back on restart.
/// The master seed is hex-encoded and wiped from memory on drop.
#[derive(Clone, Serialize, Deserialize)]
pub struct OwnerKeys {
    pub master_seed: String,
    pub authority_key: String,
    pub created_at: Timestamp,
}

impl OwnerKeys {
    /// Capture `master` for persistence.
    pub fn new(master: &MasterSecret) -> Self {
        Self {
            master_seed: hex::encode(master.expose_seed()),
            authority_key: master.public_key().to_hex(),
            created_at: Timestamp::now(),
        }
    }

    /// Rebuild the master secret, checking it against the recorded key.
    pub fn master(&self) -> Result<MasterSecret> {
        let mut bytes = hex::decode(&self.master_seed)
            .map_err(|e| GateError::Config(format!("master seed: {}", e)))?;
        let seed: std::result::Result<[u8; 32], _> = bytes.as_slice().try_into();
        bytes.zeroize();
        let mut seed = seed.map_err(|_| GateError::Config("master seed must be 32 bytes".into()))?;

        let master = MasterSecret::from_seed(seed);
        seed.zeroize();

        if master.public_key() != self.authority_key()? {
            return Err(GateError::Config(
                "master seed does not match the recorded authority key".into(),
            ));
        }
        Ok(master)
    }

    pub fn authority_key(&self) -> Result<AuthorityKey> {
        AuthorityKey::from_hex(&self.authority_key)
            .map_err(|e| GateError::Config(format!("authority key: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Drop for OwnerKeys {
    fn drop(&mut self) {
        self.master_seed.zeroize();
    }
}

impl std::fmt::Debug for OwnerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerKeys")
            .field("master_seed", &"<redacted>")
            .field("authority_key", &self.authority_key)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = GateConfig::from_json(r#"{"max_attributes": 4}"#).unwrap();
        assert_eq!(config.max_attributes, 4);
        assert_eq!(config.max_policy_len, 1024);
        assert!(config.reject_unparseable_policies);

        assert_eq!(GateConfig::from_json("{}").unwrap(), GateConfig::default());
    }

    #[test]
    fn test_config_must_be_an_object() {
        assert!(matches!(GateConfig::from_json("[]"), Err(GateError::Config(_))));
        assert!(matches!(GateConfig::from_json("[4]"), Err(GateError::Config(_))));
        assert!(matches!(GateConfig::from_json("4"), Err(GateError::Config(_))));
        assert!(matches!(GateConfig::from_json("{"), Err(GateError::Json(_))));
    }

    #[test]
    fn test_owner_keys_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.json");

        let master = MasterSecret::from_seed([0x11; 32]);
        OwnerKeys::new(&master).save(&path).unwrap();

        let loaded = OwnerKeys::load(&path).unwrap();
        let restored = loaded.master().unwrap();
        assert_eq!(restored.public_key(), master.public_key());
        assert_eq!(loaded.authority_key().unwrap(), master.public_key());
    }

    #[test]
    fn test_owner_keys_reject_mismatched_seed() {
        let mut keys = OwnerKeys::new(&MasterSecret::from_seed([0x11; 32]));
        keys.master_seed = hex::encode([0x22; 32]);
        assert!(matches!(keys.master(), Err(GateError::Config(_))));

        keys.master_seed = "abcd".into();
        assert!(matches!(keys.master(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_owner_keys_reject_bad_authority_key() {
        let mut keys = OwnerKeys::new(&MasterSecret::from_seed([0x11; 32]));
        keys.authority_key = "not hex".into();
        assert!(matches!(keys.authority_key(), Err(GateError::Config(_))));
        assert!(matches!(keys.master(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_owner_keys_debug_is_redacted() {
        let keys = OwnerKeys::new(&MasterSecret::from_seed([0x33; 32]));
        let debug = format!("{:?}", keys);
        assert!(!debug.contains(&hex::encode([0x33u8; 32])));
        assert!(debug.contains("redacted"));
    }
}

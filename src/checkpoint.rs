//! Consumer-local sync checkpoint.
//!
//! Records the last fully-applied content version plus the hash of every
//! remote file as of that version. Mutated only by the replication applier,
//! only after a full pass succeeds. Persistence uses a temp file plus
//! atomic rename.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    /// Content version of the last successfully applied manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_version: Option<String>,
    /// path -> hash of transmitted bytes, as recorded at last sync.
    #[serde(default)]
    pub local_file_hashes: BTreeMap<String, String>,
    /// path -> plaintext hash for encrypted entries.
    #[serde(default)]
    pub local_content_hashes: BTreeMap<String, String>,
}

impl SyncCheckpoint {
    /// Hash to compare a local path against a remote entry: plaintext hash
    /// when one was recorded, otherwise the transmitted hash.
    pub fn compare_hash(&self, path: &str) -> Option<&str> {
        self.local_content_hashes
            .get(path)
            .or_else(|| self.local_file_hashes.get(path))
            .map(String::as_str)
    }

    /// Whether any file hashes have been recorded. An empty checkpoint must
    /// never short-circuit change detection, even on a version match.
    pub fn has_state(&self) -> bool {
        !self.local_file_hashes.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("tmp");
        fs::write(&temp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&temp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let cp = SyncCheckpoint::load(&dir.path().join("checkpoint.json")).unwrap();
        assert_eq!(cp, SyncCheckpoint::default());
        assert!(!cp.has_state());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/checkpoint.json");

        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some("v-abc".into());
        cp.local_file_hashes
            .insert("posts/1.json".into(), "h1".into());
        cp.local_content_hashes
            .insert("drafts/d.json.enc".into(), "plain".into());
        cp.save(&path).unwrap();

        let loaded = SyncCheckpoint::load(&path).unwrap();
        assert_eq!(loaded, cp);
        // No leftover temp file.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_compare_hash_prefers_content_hash() {
        let mut cp = SyncCheckpoint::default();
        cp.local_file_hashes.insert("d.json.enc".into(), "cipher".into());
        cp.local_content_hashes.insert("d.json.enc".into(), "plain".into());
        assert_eq!(cp.compare_hash("d.json.enc"), Some("plain"));
        assert_eq!(cp.compare_hash("missing"), None);
    }
}

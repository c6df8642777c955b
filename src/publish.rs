//! Snapshot writer for the producer side.
//!
//! Writes a built snapshot into a static output directory under `sync/`,
//! where a deployment backend (object storage, SFTP, git) picks it up.
//! Payloads are written first; the manifest lands last via temp file plus
//! rename so a consumer polling mid-publish never sees a manifest that
//! references missing files.

use crate::error::{Result, SyncError};
use crate::manifest::{Snapshot, MANIFEST_PATH};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Reject manifest paths that would escape the output root.
fn validate_relative(path: &str) -> Result<&Path> {
    let rel = Path::new(path);
    if path.is_empty() || rel.is_absolute() {
        return Err(SyncError::Config(format!("invalid snapshot path: {path}")));
    }
    for component in rel.components() {
        match component {
            Component::ParentDir | Component::Prefix(_) => {
                return Err(SyncError::Config(format!(
                    "snapshot path escapes root: {path}"
                )));
            }
            _ => {}
        }
    }
    Ok(rel)
}

/// Write all snapshot payloads plus the manifest under `out_dir/sync/`.
pub async fn write_snapshot(snapshot: &Snapshot, out_dir: &Path) -> Result<()> {
    let sync_root: PathBuf = out_dir.join("sync");
    fs::create_dir_all(&sync_root).await?;

    for (path, bytes) in &snapshot.files {
        let rel = validate_relative(path)?;
        let full = sync_root.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, bytes).await?;
    }

    let manifest_bytes = serde_json::to_vec_pretty(&snapshot.manifest)?;
    let manifest_path = sync_root.join(MANIFEST_PATH);
    let temp_path = manifest_path.with_extension("json.tmp");
    fs::write(&temp_path, &manifest_bytes).await?;
    fs::rename(&temp_path, &manifest_path).await?;

    tracing::debug!(
        files = snapshot.files.len(),
        version = %snapshot.manifest.content_version,
        "snapshot written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{compute_content_version, FileEntry, Manifest, FORMAT_VERSION};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn tiny_snapshot() -> Snapshot {
        let mut files = BTreeMap::new();
        files.insert("blog.json".to_string(), b"{}".to_vec());
        files.insert("posts/p1.json".to_string(), b"{\"title\":\"x\"}".to_vec());

        let mut entries = BTreeMap::new();
        for (path, bytes) in &files {
            entries.insert(
                path.clone(),
                FileEntry {
                    hash: crate::canonical::sha256_hex(bytes),
                    size: bytes.len() as u64,
                    content_hash: None,
                    encrypted: false,
                    iv: None,
                    modified: None,
                },
            );
        }
        Snapshot {
            manifest: Manifest {
                format_version: FORMAT_VERSION,
                content_version: compute_content_version(&entries),
                last_modified_at: Utc::now(),
                app_source: "test".into(),
                app_version: "0".into(),
                blog_name: "b".into(),
                file_count: entries.len() as u64,
                files: entries,
            },
            files,
            draft_salt: None,
        }
    }

    #[tokio::test]
    async fn test_write_snapshot_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(&tiny_snapshot(), dir.path()).await.unwrap();

        assert!(dir.path().join("sync/manifest.json").exists());
        assert!(dir.path().join("sync/blog.json").exists());
        assert!(dir.path().join("sync/posts/p1.json").exists());
        assert!(!dir.path().join("sync/manifest.json.tmp").exists());

        let manifest: Manifest = serde_json::from_slice(
            &std::fs::read(dir.path().join("sync/manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.file_count, 2);
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_relative("posts/p1.json").is_ok());
        assert!(validate_relative("../escape.json").is_err());
        assert!(validate_relative("/abs.json").is_err());
        assert!(validate_relative("").is_err());
    }
}

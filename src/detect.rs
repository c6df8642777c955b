//! Change detection by hash comparison.
//!
//! Compares a freshly fetched remote manifest against the locally recorded
//! checkpoint and classifies every difference as new, modified, or deleted
//! without touching entity content. For encrypted entries the comparison
//! uses the plaintext `contentHash`, so a re-encrypted-but-unchanged draft
//! is never a false positive.

use crate::checkpoint::SyncCheckpoint;
use crate::manifest::{is_index_path, FileEntry, Manifest};

/// One changed file, carrying enough manifest metadata to fetch and (where
/// needed) decrypt it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedFile {
    pub path: String,
    pub hash: String,
    pub content_hash: Option<String>,
    pub size: u64,
    pub encrypted: bool,
    pub iv: Option<String>,
}

impl ChangedFile {
    fn from_entry(path: &str, entry: &FileEntry) -> Self {
        Self {
            path: path.to_string(),
            hash: entry.hash.clone(),
            content_hash: entry.content_hash.clone(),
            size: entry.size,
            encrypted: entry.encrypted,
            iv: entry.iv.clone(),
        }
    }

    fn deleted(path: &str, old_hash: &str) -> Self {
        Self {
            path: path.to_string(),
            hash: old_hash.to_string(),
            content_hash: None,
            size: 0,
            encrypted: false,
            iv: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub has_changes: bool,
    pub local_version: Option<String>,
    pub remote_version: String,
    pub new_files: Vec<ChangedFile>,
    pub modified_files: Vec<ChangedFile>,
    pub deleted_files: Vec<ChangedFile>,
}

/// Classify the delta between the local checkpoint and a remote manifest.
///
/// Cheap common case: when the versions match and local state exists, no
/// per-file comparison happens at all.
pub fn detect_changes(checkpoint: &SyncCheckpoint, manifest: &Manifest) -> ChangeSet {
    let mut changes = ChangeSet {
        has_changes: false,
        local_version: checkpoint.last_synced_version.clone(),
        remote_version: manifest.content_version.clone(),
        ..Default::default()
    };

    if checkpoint.last_synced_version.as_deref() == Some(manifest.content_version.as_str())
        && checkpoint.has_state()
    {
        tracing::debug!(version = %manifest.content_version, "versions match, no changes");
        return changes;
    }

    for (path, entry) in &manifest.files {
        if is_index_path(path) {
            continue;
        }
        match checkpoint.compare_hash(path) {
            None => changes.new_files.push(ChangedFile::from_entry(path, entry)),
            Some(local_hash) => {
                if local_hash != entry.compare_hash() {
                    changes
                        .modified_files
                        .push(ChangedFile::from_entry(path, entry));
                }
            }
        }
    }

    for (path, old_hash) in &checkpoint.local_file_hashes {
        if is_index_path(path) {
            continue;
        }
        if !manifest.files.contains_key(path) {
            changes
                .deleted_files
                .push(ChangedFile::deleted(path, old_hash));
        }
    }

    changes.has_changes = !changes.new_files.is_empty()
        || !changes.modified_files.is_empty()
        || !changes.deleted_files.is_empty();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{compute_content_version, FORMAT_VERSION};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn manifest_with(files: Vec<(&str, FileEntry)>) -> Manifest {
        let files: BTreeMap<String, FileEntry> = files
            .into_iter()
            .map(|(p, e)| (p.to_string(), e))
            .collect();
        Manifest {
            format_version: FORMAT_VERSION,
            content_version: compute_content_version(&files),
            last_modified_at: Utc::now(),
            app_source: "test".into(),
            app_version: "0".into(),
            blog_name: "b".into(),
            file_count: files.len() as u64,
            files,
        }
    }

    fn plain_entry(hash: &str) -> FileEntry {
        FileEntry {
            hash: hash.into(),
            size: 10,
            content_hash: None,
            encrypted: false,
            iv: None,
            modified: None,
        }
    }

    fn encrypted_entry(hash: &str, content_hash: &str) -> FileEntry {
        FileEntry {
            hash: hash.into(),
            size: 10,
            content_hash: Some(content_hash.into()),
            encrypted: true,
            iv: Some("aXZpdml2aXZpdg==".into()),
            modified: None,
        }
    }

    #[test]
    fn test_empty_checkpoint_all_new() {
        let manifest = manifest_with(vec![
            ("posts/1.json", plain_entry("h1")),
            ("posts/2.json", plain_entry("h2")),
            ("posts/3.json", plain_entry("h3")),
            ("posts/index.json", plain_entry("hi")),
        ]);
        let changes = detect_changes(&SyncCheckpoint::default(), &manifest);
        assert!(changes.has_changes);
        assert_eq!(changes.new_files.len(), 3);
        assert!(changes.modified_files.is_empty());
        assert!(changes.deleted_files.is_empty());
    }

    #[test]
    fn test_matching_version_short_circuits() {
        let manifest = manifest_with(vec![("posts/1.json", plain_entry("h1"))]);
        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some(manifest.content_version.clone());
        cp.local_file_hashes.insert("posts/1.json".into(), "stale".into());

        // Even with a stale hash map the version match wins.
        let changes = detect_changes(&cp, &manifest);
        assert!(!changes.has_changes);
    }

    #[test]
    fn test_matching_version_with_empty_state_does_not_short_circuit() {
        let manifest = manifest_with(vec![("posts/1.json", plain_entry("h1"))]);
        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some(manifest.content_version.clone());

        let changes = detect_changes(&cp, &manifest);
        assert!(changes.has_changes);
        assert_eq!(changes.new_files.len(), 1);
    }

    #[test]
    fn test_modified_and_deleted() {
        let manifest = manifest_with(vec![
            ("posts/1.json", plain_entry("h1-new")),
            ("posts/2.json", plain_entry("h2")),
        ]);
        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some("old-version".into());
        cp.local_file_hashes.insert("posts/1.json".into(), "h1-old".into());
        cp.local_file_hashes.insert("posts/2.json".into(), "h2".into());
        cp.local_file_hashes.insert("posts/3.json".into(), "h3".into());

        let changes = detect_changes(&cp, &manifest);
        assert_eq!(changes.modified_files.len(), 1);
        assert_eq!(changes.modified_files[0].path, "posts/1.json");
        assert_eq!(changes.deleted_files.len(), 1);
        assert_eq!(changes.deleted_files[0].path, "posts/3.json");
        assert!(changes.new_files.is_empty());
    }

    #[test]
    fn test_reencrypted_draft_not_reported_modified() {
        let manifest = manifest_with(vec![(
            "drafts/d.json.enc",
            encrypted_entry("cipher-new", "plain-same"),
        )]);
        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some("old".into());
        cp.local_file_hashes
            .insert("drafts/d.json.enc".into(), "cipher-old".into());
        cp.local_content_hashes
            .insert("drafts/d.json.enc".into(), "plain-same".into());

        let changes = detect_changes(&cp, &manifest);
        assert!(!changes.has_changes);
    }

    #[test]
    fn test_changed_draft_reported_modified() {
        let manifest = manifest_with(vec![(
            "drafts/d.json.enc",
            encrypted_entry("cipher-new", "plain-new"),
        )]);
        let mut cp = SyncCheckpoint::default();
        cp.last_synced_version = Some("old".into());
        cp.local_file_hashes
            .insert("drafts/d.json.enc".into(), "cipher-old".into());
        cp.local_content_hashes
            .insert("drafts/d.json.enc".into(), "plain-old".into());

        let changes = detect_changes(&cp, &manifest);
        assert_eq!(changes.modified_files.len(), 1);
        assert!(changes.modified_files[0].encrypted);
    }
}

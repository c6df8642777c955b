//! Manifest wire types.
//!
//! The manifest is the producer-authoritative description of all replicable
//! content at a point in time. File hashes are SHA-256 over the transmitted
//! bytes; encrypted entries additionally carry a plaintext `contentHash`
//! so change comparison stays invariant under re-encryption.

pub mod builder;

pub use builder::{ManifestBuilder, PublishOptions, Snapshot};

use crate::canonical::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manifest schema version.
pub const FORMAT_VERSION: u32 = 2;

/// Path of the manifest inside the `/sync/` root.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Path of the blog settings file.
pub const BLOG_PATH: &str = "blog.json";

/// Bucket directory names under the `/sync/` root.
pub mod buckets {
    pub const CATEGORIES: &str = "categories";
    pub const TAGS: &str = "tags";
    pub const POSTS: &str = "posts";
    pub const DRAFTS: &str = "drafts";
    pub const SIDEBAR: &str = "sidebar";
    pub const STATIC_FILES: &str = "static-files";
    pub const EMBED_IMAGES: &str = "embed-images";
    pub const THEMES: &str = "themes";
}

/// One replicable file as described by the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// SHA-256 of the bytes actually transmitted (post-encryption).
    pub hash: String,
    pub size: u64,
    /// SHA-256 of the plaintext canonical bytes. Present only for encrypted
    /// entries; used for change comparison instead of `hash`, which changes
    /// on every encryption due to the fresh IV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
    /// Base64 IV, present iff encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// Hash used for change comparison: plaintext hash when present,
    /// otherwise the transmitted hash.
    pub fn compare_hash(&self) -> &str {
        self.content_hash.as_deref().unwrap_or(&self.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub format_version: u32,
    /// Hash over all `(path, compare-hash)` pairs sorted by path. Changes
    /// if and only if logical content changed, never just because the
    /// manifest was regenerated.
    pub content_version: String,
    /// Latest modification timestamp among all entities. Monotonic upper
    /// bound, not cryptographically meaningful.
    pub last_modified_at: DateTime<Utc>,
    pub app_source: String,
    pub app_version: String,
    pub blog_name: String,
    pub file_count: u64,
    pub files: BTreeMap<String, FileEntry>,
}

/// Index files enumerate a category for cheap bulk listing; they are
/// excluded from per-entity change detection.
pub fn is_index_path(path: &str) -> bool {
    path.ends_with("/index.json") || path.ends_with("/index.json.enc")
}

/// Aggregate content version over a manifest file map.
///
/// Uses each entry's comparison hash (plaintext hash for encrypted
/// entries), so re-encrypting unchanged drafts with a fresh IV does not
/// move the version.
pub fn compute_content_version(files: &BTreeMap<String, FileEntry>) -> String {
    let joined: Vec<String> = files
        .iter()
        .map(|(path, entry)| format!("{}:{}", path, entry.compare_hash()))
        .collect();
    sha256_hex(joined.join("\n").as_bytes())
}

//! Manifest builder (producer side).
//!
//! Walks all replicable entities, serializes each to canonical bytes
//! (encrypting drafts when a password is configured), computes per-file
//! hashes, and assembles the manifest plus the full set of payload bytes
//! ready to publish.

use crate::canonical::{sha256_hex, to_canonical_json};
use crate::crypto::{self, Key};
use crate::error::{Result, SyncError};
use crate::manifest::{
    buckets, compute_content_version, FileEntry, Manifest, BLOG_PATH, FORMAT_VERSION,
};
use crate::model::{Embed, SyncEntity};
use crate::store::{BlobKind, EntityStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    pub app_source: String,
    pub app_version: String,
    #[serde(default)]
    pub include_drafts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_password: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            app_source: "blogsync".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            include_drafts: false,
            draft_password: None,
        }
    }
}

/// Everything a publish produces: the manifest plus the payload bytes for
/// every path it references.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub manifest: Manifest,
    pub files: BTreeMap<String, Vec<u8>>,
    /// Salt used for draft encryption this generation. Callers should
    /// persist it back to the blog settings so later generations reuse it.
    pub draft_salt: Option<String>,
}

/// Per-category index row, sorted by stable id in the index file.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    id: String,
    hash: String,
    modified: DateTime<Utc>,
}

/// Index row for raw blobs, which carry no entity timestamp.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobIndexEntry {
    id: String,
    hash: String,
}

/// Accumulates manifest entries and payload bytes during a build.
struct SnapshotWriter {
    entries: BTreeMap<String, FileEntry>,
    payloads: BTreeMap<String, Vec<u8>>,
    last_modified: DateTime<Utc>,
}

impl SnapshotWriter {
    fn new(floor: DateTime<Utc>) -> Self {
        Self {
            entries: BTreeMap::new(),
            payloads: BTreeMap::new(),
            last_modified: floor,
        }
    }

    fn bump(&mut self, modified: DateTime<Utc>) {
        if modified > self.last_modified {
            self.last_modified = modified;
        }
    }

    fn add_plain(&mut self, path: &str, bytes: Vec<u8>, modified: Option<DateTime<Utc>>) {
        if let Some(m) = modified {
            self.bump(m);
        }
        self.entries.insert(
            path.to_string(),
            FileEntry {
                hash: sha256_hex(&bytes),
                size: bytes.len() as u64,
                content_hash: None,
                encrypted: false,
                iv: None,
                modified,
            },
        );
        self.payloads.insert(path.to_string(), bytes);
    }

    fn add_encrypted(
        &mut self,
        path: &str,
        plaintext: Vec<u8>,
        key: &Key,
        modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(m) = modified {
            self.bump(m);
        }
        let enc = crypto::encrypt(&plaintext, key, None)?;
        self.entries.insert(
            path.to_string(),
            FileEntry {
                hash: sha256_hex(&enc.ciphertext),
                size: enc.ciphertext.len() as u64,
                content_hash: Some(sha256_hex(&plaintext)),
                encrypted: true,
                iv: Some(crypto::encode_b64(&enc.iv)),
                modified,
            },
        );
        self.payloads.insert(path.to_string(), enc.ciphertext);
        Ok(())
    }
}

pub struct ManifestBuilder {
    options: PublishOptions,
}

impl ManifestBuilder {
    pub fn new(options: PublishOptions) -> Self {
        Self { options }
    }

    /// Build a snapshot of all replicable content in the store.
    ///
    /// Deterministic: two builds over logically equal content produce
    /// byte-identical manifests (encrypted payload bytes differ per
    /// generation, their plaintext hashes do not).
    pub async fn build(&self, store: &dyn EntityStore) -> Result<Snapshot> {
        let mut blog = store.blog().get().await?;
        let mut writer = SnapshotWriter::new(blog.modified_at);

        // Draft key is derived once per generation from the blog's stored
        // salt, generating a fresh salt on first use.
        let draft_key: Option<Key> = match (
            self.options.include_drafts,
            self.options.draft_password.as_deref(),
        ) {
            (true, Some(password)) => {
                let salt_b64 = blog
                    .draft_salt
                    .clone()
                    .unwrap_or_else(|| crypto::encode_b64(&crypto::generate_salt()));
                let salt = crypto::decode_b64(&salt_b64)?;
                blog.draft_salt = Some(salt_b64);
                Some(crypto::derive_key(password, &salt))
            }
            (true, None) => {
                return Err(SyncError::Config(
                    "drafts enabled but no draft password configured".to_string(),
                ));
            }
            _ => None,
        };

        // Cross-entity references go on the wire as stable ids; the
        // consumer remaps them to its own local ids on apply.
        let categories = store.categories().list().await?;
        let category_map = stable_id_map(&categories);
        add_entity_bucket(&mut writer, buckets::CATEGORIES, categories, None)?;

        let tags = store.tags().list().await?;
        let tag_map = stable_id_map(&tags);
        add_entity_bucket(&mut writer, buckets::TAGS, tags, None)?;

        let mut posts: Vec<_> = store
            .posts()
            .list()
            .await?
            .into_iter()
            .filter(|p| p.published)
            .collect();
        for post in posts.iter_mut() {
            remap_to_stable(&mut post.category_id, &mut post.tag_ids, &category_map, &tag_map);
        }
        let image_refs = referenced_images(posts.iter().flat_map(|p| p.embeds.iter()));
        add_entity_bucket(&mut writer, buckets::POSTS, posts, None)?;

        if let Some(key) = &draft_key {
            let mut drafts = store.drafts().list().await?;
            for draft in drafts.iter_mut() {
                remap_to_stable(
                    &mut draft.category_id,
                    &mut draft.tag_ids,
                    &category_map,
                    &tag_map,
                );
            }
            add_entity_bucket(&mut writer, buckets::DRAFTS, drafts, Some(key))?;
        }

        let sidebar = store.sidebar().list().await?;
        add_entity_bucket(&mut writer, buckets::SIDEBAR, sidebar, None)?;

        self.add_blobs(
            &mut writer,
            store,
            BlobKind::EmbedImage,
            buckets::EMBED_IMAGES,
            image_refs,
        )
        .await?;

        let static_files = store.static_files().list().await?;
        let filenames: BTreeSet<String> =
            static_files.iter().map(|f| f.filename.clone()).collect();
        self.add_blobs(
            &mut writer,
            store,
            BlobKind::StaticFile,
            buckets::STATIC_FILES,
            filenames,
        )
        .await?;

        if let Some(theme_id) = blog.active_theme.clone() {
            if let Some(theme) = store.themes().get_by_stable_id(&theme_id).await? {
                let mut theme = theme;
                theme.set_sync_id(theme.stable_id().to_string());
                let path = format!("{}/{}.json", buckets::THEMES, theme.stable_id());
                let modified = theme.modified_at();
                writer.add_plain(&path, to_canonical_json(&theme)?, Some(modified));
            } else {
                tracing::warn!(theme = %theme_id, "active theme not found in store, skipping");
            }
        }

        // Blog settings last: the draft salt may have been assigned above.
        let blog_modified = blog.modified_at;
        writer.add_plain(BLOG_PATH, to_canonical_json(&blog)?, Some(blog_modified));

        let content_version = compute_content_version(&writer.entries);
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            content_version,
            last_modified_at: writer.last_modified,
            app_source: self.options.app_source.clone(),
            app_version: self.options.app_version.clone(),
            blog_name: blog.name.clone(),
            file_count: writer.entries.len() as u64,
            files: writer.entries,
        };

        Ok(Snapshot {
            manifest,
            files: writer.payloads,
            draft_salt: blog.draft_salt,
        })
    }

    /// Add raw blob payloads plus their category index.
    async fn add_blobs(
        &self,
        writer: &mut SnapshotWriter,
        store: &dyn EntityStore,
        kind: BlobKind,
        bucket: &str,
        names: BTreeSet<String>,
    ) -> Result<()> {
        let mut index = Vec::new();
        for name in names {
            match store.blobs().read(kind, &name).await? {
                Some(bytes) => {
                    let path = format!("{bucket}/{name}");
                    let bytes = bytes.to_vec();
                    index.push(BlobIndexEntry {
                        id: name,
                        hash: sha256_hex(&bytes),
                    });
                    writer.add_plain(&path, bytes, None);
                }
                None => {
                    tracing::warn!(blob = %name, "referenced blob missing from store, skipping");
                }
            }
        }
        let index_path = format!("{bucket}/index.json");
        writer.add_plain(&index_path, to_canonical_json(&index)?, None);
        Ok(())
    }
}

/// Serialize one entity category: a file per entity plus the index file,
/// encrypted throughout when a key is given (drafts).
fn add_entity_bucket<T: SyncEntity + Serialize>(
    writer: &mut SnapshotWriter,
    bucket: &str,
    mut entities: Vec<T>,
    key: Option<&Key>,
) -> Result<()> {
    // Stable ids are assigned before serialization so the wire copy always
    // carries the id its path uses.
    for entity in entities.iter_mut() {
        let id = entity.stable_id().to_string();
        entity.set_sync_id(id);
    }
    entities.sort_by(|a, b| a.stable_id().cmp(b.stable_id()));

    let suffix = if key.is_some() { ".json.enc" } else { ".json" };
    let mut index = Vec::with_capacity(entities.len());

    for entity in &entities {
        let path = format!("{}/{}{}", bucket, entity.stable_id(), suffix);
        let plaintext = to_canonical_json(entity)?;
        let content_hash = sha256_hex(&plaintext);
        let modified = entity.modified_at();
        match key {
            Some(key) => writer.add_encrypted(&path, plaintext, key, Some(modified))?,
            None => writer.add_plain(&path, plaintext, Some(modified)),
        }
        index.push(IndexEntry {
            // Comparison hash, so index bytes stay deterministic for
            // encrypted buckets too.
            id: entity.stable_id().to_string(),
            hash: content_hash,
            modified,
        });
    }

    // Empty categories still emit an index so consumers can distinguish
    // "never fetched" from "confirmed empty".
    let index_path = format!("{bucket}/index.json{}", if key.is_some() { ".enc" } else { "" });
    let index_bytes = to_canonical_json(&index)?;
    match key {
        Some(key) => writer.add_encrypted(&index_path, index_bytes, key, None)?,
        None => writer.add_plain(&index_path, index_bytes, None),
    }
    Ok(())
}

/// Local id (and stable id) -> stable id, for wire reference translation.
fn stable_id_map<T: SyncEntity>(entities: &[T]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for entity in entities {
        let stable = entity.stable_id().to_string();
        map.insert(entity.local_id().to_string(), stable.clone());
        map.insert(stable.clone(), stable);
    }
    map
}

/// Translate local category/tag references to stable ids, dropping any
/// reference that does not resolve.
fn remap_to_stable(
    category_id: &mut Option<String>,
    tag_ids: &mut Vec<String>,
    category_map: &HashMap<String, String>,
    tag_map: &HashMap<String, String>,
) {
    if let Some(local) = category_id.take() {
        match category_map.get(&local) {
            Some(stable) => *category_id = Some(stable.clone()),
            None => {
                tracing::warn!(category = %local, "post references unknown category, dropping");
            }
        }
    }
    *tag_ids = tag_ids
        .iter()
        .filter_map(|local| {
            let stable = tag_map.get(local).cloned();
            if stable.is_none() {
                tracing::warn!(tag = %local, "post references unknown tag, dropping");
            }
            stable
        })
        .collect();
}

/// Collect image filenames referenced by post embeds.
fn referenced_images<'a>(embeds: impl Iterator<Item = &'a Embed>) -> BTreeSet<String> {
    embeds
        .filter_map(|e| match e {
            Embed::Image { filename, .. } => Some(filename.clone()),
            _ => None,
        })
        .collect()
}

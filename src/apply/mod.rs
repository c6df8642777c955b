//! Replication applier (consumer side).
//!
//! Drives one sync pass: fetch the remote manifest, detect and categorize
//! the delta, then apply buckets in dependency order so that referencing
//! entities land after the entities they reference (categories and tags
//! before posts, image blobs before the posts whose bodies mention them).
//!
//! The pass is deliberately not transactional: upserts are idempotent and
//! the checkpoint only advances after a fully successful pass, so a failed
//! pass is retried wholesale and re-processes only what still differs.

use crate::categorize::{categorize, BucketChanges};
use crate::checkpoint::SyncCheckpoint;
use crate::crypto::{self, Key};
use crate::detect::{detect_changes, ChangedFile};
use crate::error::{Result, SyncError};
use crate::manifest::BLOG_PATH;
use crate::model::{
    stable_id_from_path, BlogSettings, Draft, Post, SyncEntity,
};
use crate::store::{BlobKind, EntityStore, Repository};
use crate::transport::RemoteFetcher;
use bytes::Bytes;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Applier state machine phases, reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Checking,
    UpToDate,
    Applying,
    Complete,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub step: String,
    pub phase: SyncPhase,
    /// 0.0 to 1.0 across the whole pass.
    pub progress: f32,
}

pub type ProgressCallback = Box<dyn Fn(&SyncProgress) + Send + Sync>;

#[derive(Default)]
pub struct SyncOptions {
    /// Password for encrypted drafts. Without it the draft bucket is
    /// skipped entirely.
    pub draft_password: Option<String>,
    pub progress: Option<ProgressCallback>,
}

/// Counts of what one pass actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub new_applied: usize,
    pub modified_applied: usize,
    pub deleted_applied: usize,
    /// Cross-entity references that could not be resolved and were dropped.
    pub dropped_references: usize,
    /// Draft changes skipped because no decryption key was available.
    pub drafts_skipped: usize,
}

/// Result of a successful pass. The caller owns checkpoint persistence;
/// the applier returns the value to persist.
#[derive(Debug)]
pub struct SyncOutcome {
    pub phase: SyncPhase,
    pub checkpoint: SyncCheckpoint,
    pub report: SyncReport,
}

/// Remote stable id -> local id, rebuilt from the store after categories
/// and tags have been applied.
struct IdMaps {
    categories: HashMap<String, String>,
    tags: HashMap<String, String>,
}

pub struct Replicator<'a> {
    fetcher: &'a dyn RemoteFetcher,
    store: &'a dyn EntityStore,
    options: SyncOptions,
}

/// Bucket apply order; used for progress fractions.
const STEPS: &[&str] = &[
    "blog settings",
    "categories",
    "tags",
    "embedded images",
    "posts",
    "drafts",
    "sidebar",
    "themes",
    "static files",
    "checkpoint",
];

impl<'a> Replicator<'a> {
    pub fn new(
        fetcher: &'a dyn RemoteFetcher,
        store: &'a dyn EntityStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
        }
    }

    fn report_progress(&self, phase: SyncPhase, step: &str, progress: f32) {
        if let Some(callback) = &self.options.progress {
            callback(&SyncProgress {
                step: step.to_string(),
                phase,
                progress,
            });
        }
    }

    fn step_progress(&self, index: usize) {
        let progress = index as f32 / STEPS.len() as f32;
        self.report_progress(SyncPhase::Applying, STEPS[index], progress);
    }

    /// Run one sync pass against the given checkpoint.
    ///
    /// On success returns the advanced checkpoint; the caller persists it.
    /// On error the passed-in checkpoint remains valid and a retry will
    /// recompute the same delta.
    pub async fn sync(&self, checkpoint: &SyncCheckpoint) -> Result<SyncOutcome> {
        self.report_progress(SyncPhase::Checking, "fetching manifest", 0.0);
        let manifest = self.fetcher.fetch_manifest().await?;

        let changes = detect_changes(checkpoint, &manifest);
        if !changes.has_changes {
            self.report_progress(SyncPhase::UpToDate, "up to date", 1.0);
            return Ok(SyncOutcome {
                phase: SyncPhase::UpToDate,
                checkpoint: checkpoint.clone(),
                report: SyncReport::default(),
            });
        }

        let categorized = categorize(&changes);
        let mut report = SyncReport::default();
        let dropped_refs = AtomicUsize::new(0);

        // Remote blog settings are needed both for the blog bucket and for
        // deriving the draft key; fetched at most once per pass.
        let mut remote_blog: Option<BlogSettings> = None;

        self.step_progress(0);
        if !categorized.blog.is_empty() {
            let blog = self.fetch_blog().await?;
            self.store.blog().set(blog.clone()).await?;
            remote_blog = Some(blog);
            if categorized.blog.new.is_empty() {
                report.modified_applied += 1;
            } else {
                report.new_applied += 1;
            }
        }

        self.step_progress(1);
        self.apply_entities(
            &categorized.categories,
            self.store.categories(),
            &mut report,
            decode_plain,
        )
        .await?;

        self.step_progress(2);
        self.apply_entities(&categorized.tags, self.store.tags(), &mut report, decode_plain)
            .await?;

        // Image blobs land before posts: post bodies reference filenames.
        self.step_progress(3);
        self.apply_blobs(
            &categorized.embed_images,
            BlobKind::EmbedImage,
            "embed-images/",
            &mut report,
        )
        .await?;

        let id_maps = IdMaps {
            categories: load_id_map(self.store.categories()).await?,
            tags: load_id_map(self.store.tags()).await?,
        };

        self.step_progress(4);
        self.apply_entities(
            &categorized.posts,
            self.store.posts(),
            &mut report,
            |file, bytes| {
                let mut post: Post = decode_plain(file, bytes)?;
                remap_post_refs(
                    &mut post.category_id,
                    &mut post.tag_ids,
                    &id_maps,
                    &dropped_refs,
                );
                Ok(post)
            },
        )
        .await?;

        self.step_progress(5);
        self.apply_drafts(&categorized.drafts, &mut remote_blog, &id_maps, &dropped_refs, &mut report)
            .await?;

        self.step_progress(6);
        self.apply_entities(
            &categorized.sidebar,
            self.store.sidebar(),
            &mut report,
            decode_plain,
        )
        .await?;

        self.step_progress(7);
        self.apply_entities(&categorized.themes, self.store.themes(), &mut report, decode_plain)
            .await?;

        self.step_progress(8);
        self.apply_static_files(&categorized.static_files, &mut report)
            .await?;

        // Checkpoint advances only now, to the full hash map from the
        // manifest, so the next check is a cheap version comparison.
        self.step_progress(9);
        let mut next = SyncCheckpoint::default();
        next.last_synced_version = Some(manifest.content_version.clone());
        for (path, entry) in &manifest.files {
            next.local_file_hashes.insert(path.clone(), entry.hash.clone());
            if let Some(content_hash) = &entry.content_hash {
                next.local_content_hashes
                    .insert(path.clone(), content_hash.clone());
            }
        }

        report.dropped_references = dropped_refs.load(Ordering::Relaxed);
        self.report_progress(SyncPhase::Complete, "complete", 1.0);
        Ok(SyncOutcome {
            phase: SyncPhase::Complete,
            checkpoint: next,
            report,
        })
    }

    async fn fetch_blog(&self) -> Result<BlogSettings> {
        let bytes = self.fetcher.fetch(BLOG_PATH).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Generic create/update/delete pass over one entity bucket.
    ///
    /// Upserts are keyed by the stable id taken from the manifest path: a
    /// "new" entry that already exists locally updates it, and a "modified"
    /// entry with no local match falls back to create. Both make a retried
    /// pass a no-op for already-applied entities. Report counts follow what
    /// actually happened to the local row, not the delta's classification.
    async fn apply_entities<T, F>(
        &self,
        bucket: &BucketChanges,
        repo: &dyn Repository<T>,
        report: &mut SyncReport,
        decode: F,
    ) -> Result<()>
    where
        T: SyncEntity + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(&ChangedFile, Bytes) -> Result<T>,
    {
        let incoming = bucket
            .new
            .iter()
            .map(|f| (f, true))
            .chain(bucket.modified.iter().map(|f| (f, false)));

        for (file, is_new) in incoming {
            let stable_id = require_stable_id(&file.path)?;
            let bytes = self.fetcher.fetch(&file.path).await?;
            let mut entity = decode(file, bytes)?;
            entity.set_sync_id(stable_id.to_string());

            match repo.get_by_stable_id(stable_id).await? {
                Some(existing) => {
                    // Never touches the local id or sync id of the stored row.
                    entity.set_local_id(existing.local_id().to_string());
                    repo.update(entity).await?;
                    report.modified_applied += 1;
                }
                None => {
                    if !is_new {
                        tracing::warn!(
                            path = %file.path,
                            "modified entity missing locally, creating instead"
                        );
                    }
                    entity.set_local_id(String::new());
                    repo.create(entity).await?;
                    report.new_applied += 1;
                }
            }
        }

        for file in &bucket.deleted {
            let stable_id = require_stable_id(&file.path)?;
            if let Some(existing) = repo.get_by_stable_id(stable_id).await? {
                repo.delete(existing.local_id()).await?;
                report.deleted_applied += 1;
            }
        }
        Ok(())
    }

    /// Drafts are applied only when a decryption key is available; payloads
    /// are decrypted before decoding. A missing IV on an encrypted entry is
    /// a manifest inconsistency and fails the pass.
    async fn apply_drafts(
        &self,
        bucket: &BucketChanges,
        remote_blog: &mut Option<BlogSettings>,
        id_maps: &IdMaps,
        dropped_refs: &AtomicUsize,
        report: &mut SyncReport,
    ) -> Result<()> {
        if bucket.is_empty() {
            return Ok(());
        }
        let password = match &self.options.draft_password {
            Some(p) => p,
            None => {
                let skipped =
                    bucket.new.len() + bucket.modified.len() + bucket.deleted.len();
                tracing::debug!(skipped, "no draft password configured, skipping drafts");
                report.drafts_skipped = skipped;
                return Ok(());
            }
        };

        // Deletions are keyed by stable id and need no decryption; a remote
        // that stopped publishing drafts no longer carries a salt at all.
        if bucket.new.is_empty() && bucket.modified.is_empty() {
            return self
                .apply_entities(bucket, self.store.drafts(), report, decode_plain::<Draft>)
                .await;
        }

        if remote_blog.is_none() {
            *remote_blog = Some(self.fetch_blog().await?);
        }
        let salt_b64 = remote_blog
            .as_ref()
            .and_then(|b| b.draft_salt.clone())
            .ok_or_else(|| {
                SyncError::Config("remote has encrypted drafts but no draft salt".to_string())
            })?;
        let key = crypto::derive_key(password, &crypto::decode_b64(&salt_b64)?);

        self.apply_entities(bucket, self.store.drafts(), report, |file, bytes| {
            let mut draft: Draft = decode_encrypted(file, bytes, &key)?;
            remap_post_refs(
                &mut draft.category_id,
                &mut draft.tag_ids,
                id_maps,
                dropped_refs,
            );
            Ok(draft)
        })
        .await
    }

    /// Download blob payloads concurrently (independent I/O within one
    /// bucket), then write them in order.
    async fn apply_blobs(
        &self,
        bucket: &BucketChanges,
        kind: BlobKind,
        prefix: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        let incoming: Vec<&ChangedFile> =
            bucket.new.iter().chain(bucket.modified.iter()).collect();
        let fetched = try_join_all(incoming.iter().map(|file| async move {
            let bytes = self.fetcher.fetch(&file.path).await?;
            Ok::<_, SyncError>((*file, bytes))
        }))
        .await?;

        for (file, bytes) in fetched {
            let name = blob_name(&file.path, prefix)?;
            self.store.blobs().write(kind, name, bytes).await?;
        }
        report.new_applied += bucket.new.len();
        report.modified_applied += bucket.modified.len();

        for file in &bucket.deleted {
            let name = blob_name(&file.path, prefix)?;
            self.store.blobs().delete(kind, name).await?;
            report.deleted_applied += 1;
        }
        Ok(())
    }

    /// Static files carry both a blob and a metadata row keyed by filename.
    async fn apply_static_files(
        &self,
        bucket: &BucketChanges,
        report: &mut SyncReport,
    ) -> Result<()> {
        let incoming: Vec<&ChangedFile> =
            bucket.new.iter().chain(bucket.modified.iter()).collect();
        let fetched = try_join_all(incoming.iter().map(|file| async move {
            let bytes = self.fetcher.fetch(&file.path).await?;
            Ok::<_, SyncError>((*file, bytes))
        }))
        .await?;

        let repo = self.store.static_files();
        for (file, bytes) in fetched {
            let name = blob_name(&file.path, "static-files/")?;
            self.store
                .blobs()
                .write(BlobKind::StaticFile, name, bytes.clone())
                .await?;

            let meta = crate::model::StaticFileMeta {
                local_id: String::new(),
                sync_id: Some(name.to_string()),
                filename: name.to_string(),
                size: bytes.len() as u64,
                modified_at: chrono::Utc::now(),
            };
            match repo.get_by_stable_id(name).await? {
                Some(existing) => {
                    let mut meta = meta;
                    meta.set_local_id(existing.local_id().to_string());
                    repo.update(meta).await?;
                    report.modified_applied += 1;
                }
                None => {
                    repo.create(meta).await?;
                    report.new_applied += 1;
                }
            }
        }

        for file in &bucket.deleted {
            let name = blob_name(&file.path, "static-files/")?;
            if let Some(existing) = repo.get_by_stable_id(name).await? {
                repo.delete(existing.local_id()).await?;
            }
            self.store.blobs().delete(BlobKind::StaticFile, name).await?;
            report.deleted_applied += 1;
        }
        Ok(())
    }
}

fn require_stable_id(path: &str) -> Result<&str> {
    stable_id_from_path(path)
        .ok_or_else(|| SyncError::Config(format!("manifest path has no stable id: {path}")))
}

fn blob_name<'p>(path: &'p str, prefix: &str) -> Result<&'p str> {
    path.strip_prefix(prefix)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SyncError::Config(format!("unexpected blob path: {path}")))
}

fn decode_plain<T: DeserializeOwned>(_file: &ChangedFile, bytes: Bytes) -> Result<T> {
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_encrypted<T: DeserializeOwned>(
    file: &ChangedFile,
    bytes: Bytes,
    key: &Key,
) -> Result<T> {
    let iv_b64 = file.iv.as_deref().ok_or_else(|| SyncError::MissingIv {
        path: file.path.clone(),
    })?;
    let iv = crypto::decode_b64(iv_b64)?;
    let plaintext = crypto::decrypt(&bytes, &iv, key)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Remap wire category/tag references to local ids. Unresolvable
/// references are dropped rather than failing the entity.
fn remap_post_refs(
    category_id: &mut Option<String>,
    tag_ids: &mut Vec<String>,
    id_maps: &IdMaps,
    dropped: &AtomicUsize,
) {
    if let Some(remote_id) = category_id.take() {
        match id_maps.categories.get(&remote_id) {
            Some(local) => *category_id = Some(local.clone()),
            None => {
                tracing::warn!(category = %remote_id, "category reference unresolved, dropping");
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    tag_ids.retain(|remote_id| {
        let resolved = id_maps.tags.contains_key(remote_id);
        if !resolved {
            tracing::warn!(tag = %remote_id, "tag reference unresolved, dropping");
            dropped.fetch_add(1, Ordering::Relaxed);
        }
        resolved
    });
    let remapped: Vec<String> = tag_ids
        .iter()
        .map(|remote_id| id_maps.tags[remote_id].clone())
        .collect();
    *tag_ids = remapped;
}

async fn load_id_map<T: SyncEntity + Send + Sync + 'static>(
    repo: &dyn Repository<T>,
) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for entity in repo.list().await? {
        map.insert(entity.stable_id().to_string(), entity.local_id().to_string());
        map.insert(entity.local_id().to_string(), entity.local_id().to_string());
    }
    Ok(map)
}

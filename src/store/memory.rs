//! In-memory entity store.
//!
//! Reference implementation of the repository seams. Lookup by stable id
//! checks `sync_id` first, then falls back to local id, matching the
//! stable-id rule used in manifest paths.

use crate::error::{Result, SyncError};
use crate::model::{
    BlogSettings, Category, Draft, Post, SidebarItem, StaticFileMeta, SyncEntity, Tag, Theme,
};
use crate::store::{BlobKind, BlobStore, BlogRepository, EntityStore, Repository};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// One entity table keyed by local id.
struct Table<T> {
    rows: RwLock<HashMap<String, T>>,
    next_id: AtomicU64,
    prefix: &'static str,
}

impl<T: SyncEntity + Clone> Table<T> {
    fn new(prefix: &'static str) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            prefix,
        }
    }

    fn alloc_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }

    fn lock_err() -> SyncError {
        SyncError::Store("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl<T: SyncEntity + Clone + Send + Sync + 'static> Repository<T> for Table<T> {
    async fn get_by_stable_id(&self, stable_id: &str) -> Result<Option<T>> {
        let rows = self.rows.read().map_err(|_| Self::lock_err())?;
        if let Some(found) = rows.values().find(|e| e.sync_id() == Some(stable_id)) {
            return Ok(Some(found.clone()));
        }
        Ok(rows.get(stable_id).cloned())
    }

    async fn list(&self) -> Result<Vec<T>> {
        let rows = self.rows.read().map_err(|_| Self::lock_err())?;
        let mut all: Vec<T> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.local_id().cmp(b.local_id()));
        Ok(all)
    }

    async fn create(&self, mut entity: T) -> Result<T> {
        let mut rows = self.rows.write().map_err(|_| Self::lock_err())?;
        if entity.local_id().is_empty() {
            entity.set_local_id(self.alloc_id());
        }
        rows.insert(entity.local_id().to_string(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: T) -> Result<T> {
        let mut rows = self.rows.write().map_err(|_| Self::lock_err())?;
        if !rows.contains_key(entity.local_id()) {
            return Err(SyncError::Store(format!(
                "update of unknown entity {}",
                entity.local_id()
            )));
        }
        rows.insert(entity.local_id().to_string(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, local_id: &str) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| Self::lock_err())?;
        rows.remove(local_id);
        Ok(())
    }
}

struct MemoryBlog {
    settings: RwLock<Option<BlogSettings>>,
}

#[async_trait]
impl BlogRepository for MemoryBlog {
    async fn get(&self) -> Result<BlogSettings> {
        let guard = self
            .settings
            .read()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))?;
        guard
            .clone()
            .ok_or_else(|| SyncError::Config("blog settings not initialized".into()))
    }

    async fn set(&self, settings: BlogSettings) -> Result<()> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))?;
        *guard = Some(settings);
        Ok(())
    }
}

struct MemoryBlobs {
    blobs: Mutex<HashMap<(BlobKind, String), Bytes>>,
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn read(&self, kind: BlobKind, name: &str) -> Result<Option<Bytes>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))?;
        Ok(blobs.get(&(kind, name.to_string())).cloned())
    }

    async fn write(&self, kind: BlobKind, name: &str, bytes: Bytes) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))?;
        blobs.insert((kind, name.to_string()), bytes);
        Ok(())
    }

    async fn delete(&self, kind: BlobKind, name: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".into()))?;
        blobs.remove(&(kind, name.to_string()));
        Ok(())
    }
}

/// Complete in-memory `EntityStore`.
pub struct MemoryStore {
    blog: MemoryBlog,
    categories: Table<Category>,
    tags: Table<Tag>,
    posts: Table<Post>,
    drafts: Table<Draft>,
    sidebar: Table<SidebarItem>,
    static_files: Table<StaticFileMeta>,
    themes: Table<Theme>,
    blobs: MemoryBlobs,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            blog: MemoryBlog {
                settings: RwLock::new(Some(BlogSettings {
                    name: String::new(),
                    description: String::new(),
                    author: String::new(),
                    base_url: String::new(),
                    draft_salt: None,
                    active_theme: None,
                    modified_at: Utc::now(),
                })),
            },
            categories: Table::new("cat"),
            tags: Table::new("tag"),
            posts: Table::new("post"),
            drafts: Table::new("draft"),
            sidebar: Table::new("side"),
            static_files: Table::new("file"),
            themes: Table::new("theme"),
            blobs: MemoryBlobs {
                blobs: Mutex::new(HashMap::new()),
            },
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryStore {
    fn blog(&self) -> &dyn BlogRepository {
        &self.blog
    }
    fn categories(&self) -> &dyn Repository<Category> {
        &self.categories
    }
    fn tags(&self) -> &dyn Repository<Tag> {
        &self.tags
    }
    fn posts(&self) -> &dyn Repository<Post> {
        &self.posts
    }
    fn drafts(&self) -> &dyn Repository<Draft> {
        &self.drafts
    }
    fn sidebar(&self) -> &dyn Repository<SidebarItem> {
        &self.sidebar
    }
    fn static_files(&self) -> &dyn Repository<StaticFileMeta> {
        &self.static_files
    }
    fn themes(&self) -> &dyn Repository<Theme> {
        &self.themes
    }
    fn blobs(&self) -> &dyn BlobStore {
        &self.blobs
    }
}

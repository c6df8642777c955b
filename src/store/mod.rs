//! Entity-store seams.
//!
//! The storage engine itself is an external collaborator; the replication
//! subsystem only needs CRUD plus lookup-by-stable-id per entity type, and
//! blob read/write for uploads. `MemoryStore` provides a complete in-memory
//! implementation for tests and embedders without a database.

pub mod memory;

use crate::error::Result;
use crate::model::{
    BlogSettings, Category, Draft, Post, SidebarItem, StaticFileMeta, SyncEntity, Tag, Theme,
};
use async_trait::async_trait;
use bytes::Bytes;

/// CRUD plus stable-id lookup for one entity type.
///
/// `create` assigns a local id when the entity arrives without one and
/// returns the stored value. `update` matches on local id and must never
/// change `local_id` or `sync_id`. `delete` by local id is a no-op when the
/// entity is already gone.
#[async_trait]
pub trait Repository<T: SyncEntity + Send + Sync + 'static>: Send + Sync {
    async fn get_by_stable_id(&self, stable_id: &str) -> Result<Option<T>>;
    async fn list(&self) -> Result<Vec<T>>;
    async fn create(&self, entity: T) -> Result<T>;
    async fn update(&self, entity: T) -> Result<T>;
    async fn delete(&self, local_id: &str) -> Result<()>;
}

/// Singleton blog settings.
#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn get(&self) -> Result<BlogSettings>;
    async fn set(&self, settings: BlogSettings) -> Result<()>;
}

/// Which blob namespace a payload lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    StaticFile,
    EmbedImage,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, kind: BlobKind, name: &str) -> Result<Option<Bytes>>;
    async fn write(&self, kind: BlobKind, name: &str, bytes: Bytes) -> Result<()>;
    async fn delete(&self, kind: BlobKind, name: &str) -> Result<()>;
}

/// Facade composing the per-entity repositories.
pub trait EntityStore: Send + Sync {
    fn blog(&self) -> &dyn BlogRepository;
    fn categories(&self) -> &dyn Repository<Category>;
    fn tags(&self) -> &dyn Repository<Tag>;
    fn posts(&self) -> &dyn Repository<Post>;
    fn drafts(&self) -> &dyn Repository<Draft>;
    fn sidebar(&self) -> &dyn Repository<SidebarItem>;
    fn static_files(&self) -> &dyn Repository<StaticFileMeta>;
    fn themes(&self) -> &dyn Repository<Theme>;
    fn blobs(&self) -> &dyn BlobStore;
}

//! Content replication for blog platforms.
//!
//! A published blog's content (posts, categories, tags, sidebar, static
//! files, embedded images, optionally encrypted drafts) is expressed as a
//! versioned, content-addressed manifest. A second instance pulls the
//! manifest over HTTP, detects exactly what changed since its last sync by
//! hash comparison, and applies only that delta, idempotently.
//!
//! # Architecture
//!
//! ```text
//! Producer:                           Consumer:
//! +------------------+               +-----------------+
//! | ManifestBuilder  | --manifest--> | detect_changes  |
//! | (canonical bytes,|               | (hash compare)  |
//! |  SHA-256, AEAD)  |               +--------+--------+
//! +------------------+                        |
//!                                    +--------v--------+
//!                                    |   categorize    |
//!                                    +--------+--------+
//!                                             |
//!                                    +--------v--------+
//!                                    |   Replicator    |
//!                                    | (ordered apply) |
//!                                    +-----------------+
//! ```
//!
//! Two producers holding logically equal content agree on the manifest's
//! content version (encrypted payload bytes and their IVs differ per
//! generation); re-applying the same remote state twice is a no-op.
//! Encrypted drafts carry a plaintext `contentHash` so that change
//! detection is invariant under re-encryption with a fresh IV.

pub mod apply;
pub mod canonical;
pub mod categorize;
pub mod checkpoint;
pub mod crypto;
pub mod detect;
pub mod error;
pub mod manifest;
pub mod model;
pub mod publish;
pub mod store;
pub mod transport;

pub use apply::{Replicator, SyncOptions, SyncOutcome, SyncPhase, SyncProgress, SyncReport};
pub use categorize::{categorize, BucketChanges, CategorizedChanges};
pub use checkpoint::SyncCheckpoint;
pub use detect::{detect_changes, ChangeSet, ChangedFile};
pub use error::{Result, SyncError};
pub use manifest::{FileEntry, Manifest, ManifestBuilder, PublishOptions, Snapshot};
pub use model::{
    stable_id_from_path, BlogSettings, Category, Draft, Embed, Post, SidebarContent, SidebarItem,
    SidebarLink, StaticFileMeta, SyncEntity, Tag, Theme,
};
pub use store::{memory::MemoryStore, BlobKind, BlobStore, EntityStore, Repository};
pub use transport::{http::HttpFetcher, memory::SnapshotFetcher, RemoteFetcher};

//! Remote fetch seam.
//!
//! The applier pulls manifest and payloads through `RemoteFetcher`; the
//! HTTP implementation talks to a site's public `/sync/` root, the memory
//! implementation serves a snapshot directly for tests.

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::manifest::Manifest;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch one file by its manifest path (relative to the sync root).
    async fn fetch(&self, path: &str) -> Result<Bytes>;

    /// Fetch and parse the remote manifest. A missing manifest means sync
    /// is not enabled on the remote and surfaces as `ManifestNotFound`.
    async fn fetch_manifest(&self) -> Result<Manifest>;
}

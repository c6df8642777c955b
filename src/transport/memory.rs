//! In-memory fetcher serving a producer snapshot directly.
//!
//! Lets producer-to-consumer replication be exercised end to end without a
//! network; also useful for embedders that move snapshots out of band.

use crate::error::{Result, SyncError};
use crate::manifest::{Manifest, Snapshot};
use crate::transport::RemoteFetcher;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

pub struct SnapshotFetcher {
    manifest: Manifest,
    files: BTreeMap<String, Vec<u8>>,
}

impl SnapshotFetcher {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            manifest: snapshot.manifest,
            files: snapshot.files,
        }
    }
}

#[async_trait]
impl RemoteFetcher for SnapshotFetcher {
    async fn fetch(&self, path: &str) -> Result<Bytes> {
        self.files
            .get(path)
            .map(|bytes| Bytes::from(bytes.clone()))
            .ok_or_else(|| SyncError::Network {
                url: format!("memory:{path}"),
                timeout: false,
            })
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.clone())
    }
}

//! HTTP fetcher for a site's public `/sync/` root.
//!
//! Every request carries `Cache-Control: no-cache`: the sync root is polled
//! repeatedly from CDN-fronted static hosting and a cached manifest would
//! stall change detection. Timeouts are bounded and surface as typed
//! network errors rather than hanging.

use crate::error::{Result, SyncError};
use crate::manifest::{Manifest, MANIFEST_PATH};
use crate::transport::RemoteFetcher;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use reqwest::StatusCode;
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    /// `base_url` is the site root; the fetcher appends `/sync/<path>`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/sync/{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, Bytes)> {
        let url = self.url_for(path);
        let response = self.client.get(&url).send().await.map_err(|e| {
            SyncError::Network {
                url: url.clone(),
                timeout: e.is_timeout(),
            }
        })?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| SyncError::Network {
            url: url.clone(),
            timeout: e.is_timeout(),
        })?;
        Ok((status, body))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Bytes> {
        let (status, body) = self.get(path).await?;
        if !status.is_success() {
            return Err(SyncError::Network {
                url: self.url_for(path),
                timeout: false,
            });
        }
        Ok(body)
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        let (status, body) = self.get(MANIFEST_PATH).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::ManifestNotFound {
                url: self.url_for(MANIFEST_PATH),
            });
        }
        if !status.is_success() {
            return Err(SyncError::Network {
                url: self.url_for(MANIFEST_PATH),
                timeout: false,
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let fetcher = HttpFetcher::new("https://example.com/").unwrap();
        assert_eq!(
            fetcher.url_for("posts/p1.json"),
            "https://example.com/sync/posts/p1.json"
        );
    }

    /// Answer every request on the listener with the given status line and
    /// an empty body.
    async fn spawn_status_server(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_manifest_404_maps_to_manifest_not_found() {
        let addr = spawn_status_server("HTTP/1.1 404 Not Found").await;
        let fetcher = HttpFetcher::new(format!("http://{addr}")).unwrap();
        assert!(matches!(
            fetcher.fetch_manifest().await.unwrap_err(),
            SyncError::ManifestNotFound { .. }
        ));
        // A 404 on an ordinary payload is a plain network error.
        assert!(matches!(
            fetcher.fetch("posts/p1.json").await.unwrap_err(),
            SyncError::Network { timeout: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_retryable_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept connections and never answer.
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    drop(socket);
                });
            }
        });

        let fetcher =
            HttpFetcher::with_timeout(format!("http://{addr}"), Duration::from_millis(200))
                .unwrap();
        let err = fetcher.fetch_manifest().await.unwrap_err();
        assert!(matches!(err, SyncError::Network { timeout: true, .. }));
        assert!(err.is_retryable());
    }
}

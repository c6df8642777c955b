// Error taxonomy for the replication subsystem.
//
// Network failures abort an apply pass without advancing the checkpoint;
// authentication failures are surfaced distinctly so callers can re-prompt
// for credentials.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetch failed (non-2xx, connection error, or timeout).
    #[error("network error fetching {url} (timeout: {timeout})")]
    Network { url: String, timeout: bool },

    /// 404 on the manifest itself: sync is not enabled on the remote.
    #[error("no sync manifest found at {url}")]
    ManifestNotFound { url: String },

    /// AEAD tag verification failed: wrong password or corrupted ciphertext.
    #[error("decryption failed: wrong password or corrupted data")]
    Authentication,

    /// Manifest lists an encrypted entry without an IV; it cannot be decrypted.
    #[error("encrypted entry {path} has no IV")]
    MissingIv { path: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entity store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether a retry of the whole sync pass can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { .. } | SyncError::Io(_))
    }
}

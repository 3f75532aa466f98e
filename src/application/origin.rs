//! Contract for the remote catalog and image host.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Unavailable { url: String, message: String },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
}

/// Fetches raw response bodies. Implementations decode transfer encodings
/// and enforce their own timeout.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, OriginError>;
}

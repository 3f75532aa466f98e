//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::blob::BlobPath;
use crate::domain::entities::{BlobReferences, CatalogDetail, Term};
use crate::domain::types::{BlobField, TermKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable store for catalog items, their episodes and categorization terms.
///
/// All writes are idempotent: rows that already exist are left untouched.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Item by slug with categories, countries and episodes preloaded.
    async fn find_detail_by_slug(&self, slug: &str) -> Result<Option<CatalogDetail>, RepoError>;

    /// Current blob references for the given item ids. Unknown ids are
    /// omitted from the result.
    async fn find_blob_references(&self, ids: &[String])
    -> Result<Vec<BlobReferences>, RepoError>;

    /// Item, its terms and its episodes in one transaction.
    async fn save_detail(&self, detail: &CatalogDetail) -> Result<(), RepoError>;

    async fn save_terms(&self, kind: TermKind, terms: &[Term]) -> Result<(), RepoError>;

    /// Blob references of every stored item.
    async fn scan_blob_references(&self) -> Result<Vec<BlobReferences>, RepoError>;

    async fn update_blob_reference(
        &self,
        slug: &str,
        field: BlobField,
        value: &str,
    ) -> Result<(), RepoError>;
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob store i/o failed for `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("blob store is unavailable: {0}")]
    Unavailable(String),
}

/// Path-addressed object storage for mirrored blobs.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    async fn get(&self, path: &BlobPath) -> Result<Option<Bytes>, BlobStoreError>;

    /// Writes the object, creating the container on first use.
    async fn put(
        &self,
        path: &BlobPath,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobStoreError>;

    /// Size of the stored object, `None` when absent.
    async fn stat(&self, path: &BlobPath) -> Result<Option<u64>, BlobStoreError>;
}
